/// Identifier for a node in a [`crate::graph::Graph`].
///
/// This is an index into `Graph::nodes`, and into every per-node array the
/// engine keeps alongside it (layout data, bodies, displacement buffers).
pub type NodeId = usize;

/// Identifier for an edge in a [`crate::graph::Graph`] (an index into `Graph::edges`).
pub type EdgeId = usize;

/// Index of a region inside a [`crate::region::RegionTree`] arena.
pub type RegionId = usize;
