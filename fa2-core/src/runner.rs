//! Driving loop: step an engine until a stop condition holds.

use crate::{
    engine::ForceAtlas2,
    error::{Error, Result},
    graph::Graph,
};
use tracing::info;

/// How often progress is logged.
const PROGRESS_EVERY: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StopCondition {
    /// Run exactly this many steps.
    Steps(u64),
    /// Run until the distance moved per node drops to the target, or
    /// `max_steps` steps have run.
    Converged {
        target_change_per_node: f64,
        max_steps: u64,
    },
}

impl StopCondition {
    pub fn validate(&self) -> Result<()> {
        match *self {
            StopCondition::Steps(0) => Err(Error::InvalidStopCondition("step count must be at least 1")),
            StopCondition::Steps(_) => Ok(()),
            StopCondition::Converged {
                target_change_per_node,
                max_steps,
            } => {
                if !(target_change_per_node.is_finite() && target_change_per_node > 0.0) {
                    Err(Error::InvalidStopCondition("target change per node must be positive"))
                } else if max_steps == 0 {
                    Err(Error::InvalidStopCondition("max_steps must be at least 1"))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn step_cap(&self) -> u64 {
        match *self {
            StopCondition::Steps(n) => n,
            StopCondition::Converged { max_steps, .. } => max_steps,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    StepsCompleted,
    Converged,
    StepLimit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub steps: u64,
    pub last_distance: f64,
    /// `last_distance` divided by the node count (0 for an empty graph).
    pub change_per_node: f64,
    pub reason: StopReason,
    /// Distance moved by each step, in order.
    pub distances: Vec<f64>,
}

/// Steps `engine` over `graph` until `stop` holds.
///
/// At least one step always runs. Under [`StopCondition::Converged`] the
/// target is first checked after the second step; `max_steps` still caps
/// the run.
pub fn run(engine: &mut ForceAtlas2, graph: &mut Graph, stop: StopCondition) -> Result<RunSummary> {
    stop.validate()?;
    let nodes = engine.node_count();
    let cap = stop.step_cap();
    let mut distances = Vec::with_capacity(cap.min(1 << 16) as usize);
    let mut change_per_node: f64;

    let reason = loop {
        let distance = engine.step(graph)?;
        distances.push(distance);
        change_per_node = if nodes > 0 {
            distance / nodes as f64
        } else {
            0.0
        };

        let steps = distances.len() as u64;
        if steps % PROGRESS_EVERY == 0 {
            info!(step = steps, change_per_node, "layout progress");
        }

        if let StopCondition::Converged {
            target_change_per_node,
            ..
        } = stop
        {
            // The first step moves from a zero previous displacement, so its
            // distance says nothing about convergence.
            if steps > 1 && change_per_node <= target_change_per_node {
                break StopReason::Converged;
            }
        }
        if steps >= cap {
            break match stop {
                StopCondition::Steps(_) => StopReason::StepsCompleted,
                StopCondition::Converged { .. } => StopReason::StepLimit,
            };
        }
    };

    let summary = RunSummary {
        steps: distances.len() as u64,
        last_distance: distances.last().copied().unwrap_or(0.0),
        change_per_node,
        reason,
        distances,
    };
    info!(
        steps = summary.steps,
        change_per_node = summary.change_per_node,
        reason = ?summary.reason,
        "layout finished"
    );
    Ok(summary)
}
