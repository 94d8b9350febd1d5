//! The parallel passes of one layout step.
//!
//! A step runs, in order:
//! 1. [`swap_phase`] — current displacement becomes the previous one.
//! 2. [`maintain_tree`] — rebuild or refresh the region tree.
//! 3. [`repulsion_gravity_phase`] — one-sided forces, partitioned by node.
//! 4. [`attraction_phase`] then [`reduce_phase`] — edge forces into
//!    per-worker [`DisplacementBuffer`]s, merged per node afterwards.
//! 5. [`speed_phase`] — total swinging and traction for the speed update.
//! 6. [`integrate_phase`] — move the nodes, returning the distance moved.
//!
//! Every function returns only once all of its tasks have finished.

use crate::{
    config::{Config, Dimensions},
    displacement_buffer::DisplacementBuffer,
    error::Result,
    forces::{Attraction, Body, ForceModel, Repulsion},
    graph::Node,
    layout_data::LayoutData,
    pool::{Phase, WorkerPool, worker_ranges},
    region::RegionTree,
    types::NodeId,
};
use glam::DVec3;

/// An edge with its weight already resolved and raised to the configured
/// influence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightedEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub weight: f64,
}

/// What [`maintain_tree`] did on this step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeUpdate {
    Disabled,
    Rebuilt,
    Refreshed,
    Reused,
}

/// How the integration step scales each node's displacement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Integration {
    /// `speed / (1 + sqrt(speed * swinging))`.
    Standard,
    /// Standard factor, divided by ten and capped at a step length of 10.
    AltSpeed,
    /// Swinging is unreliable while nodes overlap, so the factor is
    /// damped and the step length capped at 10.
    AntiCollision,
}

impl Integration {
    pub fn from_config(cfg: &Config) -> Self {
        if cfg.adjust_sizes {
            Integration::AntiCollision
        } else if cfg.alt_speed {
            Integration::AltSpeed
        } else {
            Integration::Standard
        }
    }

    /// Multiplier applied to the displacement of one node.
    ///
    /// ### Parameters
    /// - `speed` - Global speed of this step.
    /// - `swinging` - The node's own swinging.
    /// - `length` - Length of the node's displacement.
    #[inline]
    pub fn factor(self, speed: f64, swinging: f64, length: f64) -> f64 {
        let local = speed / (1.0 + (speed * swinging).sqrt());
        match self {
            Integration::Standard => local,
            Integration::AltSpeed => {
                if length > 0.0 {
                    (0.1 * local).min(MAX_STEP / length)
                } else {
                    0.1 * local
                }
            }
            Integration::AntiCollision => {
                let factor = 0.1 * local;
                if length > 0.0 {
                    (factor * length).min(MAX_STEP) / length
                } else {
                    factor
                }
            }
        }
    }
}

const MAX_STEP: f64 = 10.0;

/// Copies position, size and mass of every node into `out`.
///
/// In 2D the z coordinate is dropped, so no force, region or speed total
/// ever sees it.
pub fn collect_bodies(nodes: &[Node], data: &[LayoutData], dims: Dimensions, out: &mut Vec<Body>) {
    out.clear();
    out.extend(nodes.iter().zip(data).map(|(n, d)| {
        let mut position = n.position;
        if !dims.is_3d() {
            position.z = 0.0;
        }
        Body::new(position, n.size, d.mass())
    }));
}

/// Moves every node's current displacement into its previous one.
pub fn swap_phase(pool: &WorkerPool, data: &mut [LayoutData]) -> Result<()> {
    pool.for_each_chunk(Phase::Swap, data, |_, chunk| {
        for d in chunk {
            d.swap();
        }
    })?;
    Ok(())
}

/// Keeps the region tree in line with the refresh policy.
///
/// The tree is rebuilt when none exists yet or `step` is a multiple of
/// `tree_refresh_interval`. On other steps it is refreshed in place if
/// `refresh_center_when_not_rebuilding` is set, and reused as is otherwise.
pub fn maintain_tree(
    pool: &WorkerPool,
    tree: &mut Option<RegionTree>,
    bodies: &[Body],
    cfg: &Config,
    step: u64,
) -> Result<TreeUpdate> {
    if !cfg.barnes_hut_optimize {
        *tree = None;
        return Ok(TreeUpdate::Disabled);
    }

    if let Some(t) = tree.as_mut() {
        if step % cfg.tree_refresh_interval != 0 {
            if !cfg.refresh_center_when_not_rebuilding {
                return Ok(TreeUpdate::Reused);
            }
            t.refresh(bodies, pool)?;
            return Ok(TreeUpdate::Refreshed);
        }
    }

    *tree = Some(RegionTree::build(
        bodies,
        cfg.dimensions,
        cfg.split_rounds(),
        pool,
    )?);
    Ok(TreeUpdate::Rebuilt)
}

/// Applies gravity and repulsion to every non-pinned node.
///
/// With a tree, repulsion is approximated by [`RegionTree::apply_approximate`];
/// without one every other node is visited. Each node only writes its own
/// displacement, so tasks never share a write target.
pub fn repulsion_gravity_phase(
    pool: &WorkerPool,
    data: &mut [LayoutData],
    nodes: &[Node],
    bodies: &[Body],
    model: &ForceModel,
    tree: Option<&RegionTree>,
    theta: f64,
) -> Result<()> {
    pool.for_each_chunk(Phase::Repulsion, data, |range, chunk| {
        for (i, d) in range.zip(chunk) {
            if nodes[i].fixed {
                continue;
            }
            let body = &bodies[i];
            d.dx += model.gravity.pull(body, model.gravity_strength);
            d.dx += match tree {
                Some(t) => t.apply_approximate(bodies, i, theta, &model.repulsion),
                None => repel_from_all(bodies, i, &model.repulsion),
            };
        }
    })?;
    Ok(())
}

/// Exact repulsion felt by `node` from every other body.
pub fn repel_from_all(bodies: &[Body], node: NodeId, repulsion: &Repulsion) -> DVec3 {
    let body = &bodies[node];
    bodies
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != node)
        .map(|(_, other)| repulsion.between(body, other))
        .sum()
}

/// Accumulates edge attraction into one private buffer per worker.
///
/// Edges are split into as many contiguous ranges as there are buffers;
/// buffer `t` receives the contributions of range `t`, both endpoints
/// included. Buffers are cleared and resized to `bodies.len()` first.
pub fn attraction_phase(
    pool: &WorkerPool,
    buffers: &mut [DisplacementBuffer],
    bodies: &[Body],
    edges: &[WeightedEdge],
    attraction: &Attraction,
) -> Result<()> {
    let ranges = worker_ranges(edges.len(), buffers.len());
    pool.for_each_chunk(Phase::Attraction, buffers, |slots, chunk| {
        for (t, buf) in slots.zip(chunk) {
            buf.ensure_len(bodies.len());
            for e in &edges[ranges[t].clone()] {
                let d = attraction.between(&bodies[e.source], &bodies[e.target], e.weight);
                buf.add_pair(e.source, e.target, d);
            }
        }
    })?;
    Ok(())
}

/// Adds every buffer's contribution into the node displacements.
pub fn reduce_phase(
    pool: &WorkerPool,
    data: &mut [LayoutData],
    buffers: &[DisplacementBuffer],
) -> Result<()> {
    pool.for_each_chunk(Phase::Reduce, data, |range, chunk| {
        for (i, d) in range.zip(chunk) {
            for buf in buffers.iter().filter(|b| i < b.len() && b.is_touched(i)) {
                d.dx += buf.get(i);
            }
        }
    })?;
    Ok(())
}

/// Total swinging and traction over the non-pinned nodes.
pub fn speed_phase(pool: &WorkerPool, data: &[LayoutData], nodes: &[Node]) -> Result<(f64, f64)> {
    let partials = pool.map_ranges(Phase::Speed, data.len(), |range| {
        let mut swinging = 0.0;
        let mut traction = 0.0;
        for i in range {
            if !nodes[i].fixed {
                swinging += data[i].swinging();
                traction += data[i].traction();
            }
        }
        (swinging, traction)
    })?;
    Ok(partials
        .into_iter()
        .fold((0.0, 0.0), |(s, t), (ps, pt)| (s + ps, t + pt)))
}

/// Moves every non-pinned node by its displacement scaled by its local
/// speed factor.
///
/// ### Returns
/// The total Euclidean distance moved by all nodes.
pub fn integrate_phase(
    pool: &WorkerPool,
    nodes: &mut [Node],
    data: &[LayoutData],
    integration: Integration,
    speed: f64,
    dims: Dimensions,
) -> Result<f64> {
    let partials = pool.for_each_chunk(Phase::Integrate, nodes, |range, chunk| {
        let mut distance = 0.0;
        for (i, n) in range.zip(chunk) {
            if n.fixed {
                continue;
            }
            let d = &data[i];
            let mut dx = d.dx;
            if !dims.is_3d() {
                dx.z = 0.0;
            }
            let factor = integration.factor(speed, d.swinging(), dx.length());
            let step = dx * factor;
            n.position += step;
            distance += step.length();
        }
        distance
    })?;
    Ok(partials.into_iter().sum())
}
