use crate::pool::Phase;
use crate::types::{EdgeId, NodeId};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: `{field}` {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    #[error("edge {edge} references missing node {node}")]
    MissingEndpoint { edge: EdgeId, node: NodeId },

    #[error("node {node} is invalid: {reason}")]
    InvalidNode { node: NodeId, reason: &'static str },

    #[error("edge {edge} has a time-varying weight but no `weight_as_of` instant was configured")]
    MissingWeightInstant { edge: EdgeId },

    #[error("edge {edge} resolved to a non-finite weight ({weight})")]
    InvalidEdgeWeight { edge: EdgeId, weight: f64 },

    #[error("graph shape changed since initialization: expected {expected:?} (nodes, edges), found {found:?}")]
    GraphShapeChanged {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("invalid stop condition: {0}")]
    InvalidStopCondition(&'static str),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("worker task panicked during {phase} phase (range {start}..{end})")]
    WorkerPanicked {
        phase: Phase,
        start: usize,
        end: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
