//! Minimal graph model consumed by the layout engine.
//!
//! The engine only needs node handles with a mutable position, a size and a
//! pinned flag, plus weighted edges between node indices. Anything richer
//! (ids, labels, attributes, import/export) belongs to the caller.

use crate::config::Dimensions;
use crate::error::{Error, Result};
use crate::types::{EdgeId, NodeId};
use glam::DVec3;
use rand::Rng;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Node {
    pub position: DVec3,
    /// Radius used by the anti-collision force variants.
    pub size: f64,
    /// Pinned nodes are never moved by the engine.
    pub fixed: bool,
}

impl Node {
    pub fn at(position: DVec3) -> Self {
        Self {
            position,
            size: 0.0,
            fixed: false,
        }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn pinned(mut self) -> Self {
        self.fixed = true;
        self
    }
}

/// One point of a time-varying weight: `weight` applies from instant `from` on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightSample {
    pub from: f64,
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EdgeWeight {
    Fixed(f64),
    /// Samples sorted by `from`.
    Timeline(Vec<WeightSample>),
}

impl Default for EdgeWeight {
    fn default() -> Self {
        EdgeWeight::Fixed(1.0)
    }
}

impl EdgeWeight {
    /// Weight of the edge as seen at `as_of`.
    ///
    /// Fixed weights ignore the instant. A timeline yields the weight of the
    /// last sample starting at or before `as_of`, or 1.0 when none has started
    /// yet. Returns `None` for a timeline queried without an instant.
    pub fn resolve(&self, as_of: Option<f64>) -> Option<f64> {
        match self {
            EdgeWeight::Fixed(w) => Some(*w),
            EdgeWeight::Timeline(samples) => {
                let t = as_of?;
                let weight = samples
                    .iter()
                    .take_while(|s| s.from <= t)
                    .last()
                    .map_or(1.0, |s| s.weight);
                Some(weight)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub weight: EdgeWeight,
}

impl Edge {
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self {
            source,
            target,
            weight: EdgeWeight::default(),
        }
    }

    pub fn weighted(source: NodeId, target: NodeId, weight: f64) -> Self {
        Self {
            source,
            target,
            weight: EdgeWeight::Fixed(weight),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Undirected degree of every node. A self-loop counts twice.
    pub fn degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.nodes.len()];
        for e in &self.edges {
            if let Some(d) = degrees.get_mut(e.source) {
                *d += 1;
            }
            if let Some(d) = degrees.get_mut(e.target) {
                *d += 1;
            }
        }
        degrees
    }

    /// Checks that every edge endpoint exists and every node is usable.
    pub fn validate(&self) -> Result<()> {
        for (id, n) in self.nodes.iter().enumerate() {
            if !n.position.is_finite() {
                return Err(Error::InvalidNode {
                    node: id,
                    reason: "position is not finite",
                });
            }
            if !n.size.is_finite() || n.size < 0.0 {
                return Err(Error::InvalidNode {
                    node: id,
                    reason: "size must be finite and non-negative",
                });
            }
        }
        for (id, e) in self.edges.iter().enumerate() {
            for node in [e.source, e.target] {
                if node >= self.nodes.len() {
                    return Err(Error::MissingEndpoint { edge: id, node });
                }
            }
        }
        Ok(())
    }

    /// Resolves every edge weight once, at the configured instant.
    pub(crate) fn resolve_weights(&self, as_of: Option<f64>) -> Result<Vec<f64>> {
        self.edges
            .iter()
            .enumerate()
            .map(|(id, e)| resolve_edge(id, e, as_of))
            .collect()
    }

    /// Places every non-pinned node uniformly in `[-490, 510)` on each axis.
    ///
    /// In 2D the z coordinate is set to 0.
    pub fn seed_positions(&mut self, rng: &mut impl Rng, dims: Dimensions) {
        for n in self.nodes.iter_mut().filter(|n| !n.fixed) {
            let x = (0.01 + rng.random::<f64>()) * 1000.0 - 500.0;
            let y = (0.01 + rng.random::<f64>()) * 1000.0 - 500.0;
            let z = if dims.is_3d() {
                (0.01 + rng.random::<f64>()) * 1000.0 - 500.0
            } else {
                0.0
            };
            n.position = DVec3::new(x, y, z);
        }
    }
}

fn resolve_edge(id: EdgeId, e: &Edge, as_of: Option<f64>) -> Result<f64> {
    let weight = e
        .weight
        .resolve(as_of)
        .ok_or(Error::MissingWeightInstant { edge: id })?;
    if weight.is_finite() {
        Ok(weight)
    } else {
        Err(Error::InvalidEdgeWeight { edge: id, weight })
    }
}
