//! Random clustered graphs to lay out in the viewer.

use fa2_core::{Dimensions, Edge, Graph, Node};
use glam::DVec3;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Parameters of a planted-partition random graph: `clusters` groups of
/// `cluster_size` nodes, each pair connected with probability `p_intra`
/// inside a group and `p_inter` across groups.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterSpec {
    pub clusters: usize,
    pub cluster_size: usize,
    pub p_intra: f64,
    pub p_inter: f64,
    /// Radius given to every node, used when node sizes are adjusted.
    pub node_size: f64,
    pub seed: u64,
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            clusters: 4,
            cluster_size: 25,
            p_intra: 0.2,
            p_inter: 0.005,
            node_size: 2.0,
            seed: 1,
        }
    }
}

impl ClusterSpec {
    pub fn node_count(&self) -> usize {
        self.clusters * self.cluster_size
    }

    /// Builds the graph and scatters its nodes over the plane.
    ///
    /// The same spec always yields the same graph and positions.
    pub fn generate(&self, dims: Dimensions) -> Graph {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let n = self.node_count();
        let p_intra = self.p_intra.clamp(0.0, 1.0);
        let p_inter = self.p_inter.clamp(0.0, 1.0);

        let nodes = vec![Node::at(DVec3::ZERO).with_size(self.node_size); n];
        let mut edges = Vec::new();
        for a in 0..n {
            for b in (a + 1)..n {
                let same = a / self.cluster_size == b / self.cluster_size;
                let p = if same { p_intra } else { p_inter };
                if rng.random_bool(p) {
                    edges.push(Edge::new(a, b));
                }
            }
        }

        let mut graph = Graph::new(nodes, edges);
        graph.seed_positions(&mut rng, dims);
        graph
    }
}
