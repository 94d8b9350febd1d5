//! The ForceAtlas2 layout engine.

use crate::{
    config::Config,
    displacement_buffer::DisplacementBuffer,
    error::{Error, Result},
    forces::{Body, ForceModel},
    graph::Graph,
    layout_data::LayoutData,
    phases::{self, Integration, WeightedEdge},
    pool::WorkerPool,
    region::RegionTree,
    speed::RunState,
};
use tracing::debug;

/// Iterative force-directed layout over one graph.
///
/// The engine is initialized against a graph and then stepped with the same
/// graph (same node and edge count) as many times as the caller likes. Node
/// positions are updated in place; everything else the simulation needs
/// lives here.
pub struct ForceAtlas2 {
    config: Config,
    pool: WorkerPool,
    model: ForceModel,
    integration: Integration,
    state: RunState,
    data: Vec<LayoutData>,
    edges: Vec<WeightedEdge>,
    tree: Option<RegionTree>,
    /// One private attraction buffer per worker.
    buffers: Vec<DisplacementBuffer>,
    bodies: Vec<Body>,
    distance: f64,
}

impl ForceAtlas2 {
    /// Prepares a run over `graph`.
    ///
    /// Validates the configuration and the graph, computes node masses,
    /// resolves every edge weight once and builds the worker pool.
    ///
    /// ### Parameters
    /// - `graph` - The graph to lay out. Only read here.
    /// - `config` - Run configuration; copied and fixed for the whole run.
    ///
    /// ### Returns
    /// The engine, or the first configuration or graph error found.
    pub fn new(graph: &Graph, config: Config) -> Result<Self> {
        let config = config.validate()?;
        graph.validate()?;

        let edges = weighted_edges(graph, &config)?;
        let data: Vec<LayoutData> = graph.degrees().into_iter().map(LayoutData::new).collect();

        let compensation = if data.is_empty() {
            1.0
        } else {
            data.iter().map(LayoutData::mass).sum::<f64>() / data.len() as f64
        };
        let state = RunState {
            outbound_compensation: compensation,
            ..RunState::default()
        };

        let pool = WorkerPool::new(config.worker_count, config.failure_policy)?;
        let model = ForceModel::from_config(&config, compensation);
        let integration = Integration::from_config(&config);
        let buffers = vec![DisplacementBuffer::with_len(data.len()); pool.workers()];

        debug!(
            nodes = data.len(),
            edges = edges.len(),
            workers = pool.workers(),
            split_rounds = config.split_rounds(),
            ?model,
            ?integration,
            "layout initialized"
        );

        Ok(Self {
            config,
            pool,
            model,
            integration,
            state,
            data,
            edges,
            tree: None,
            buffers,
            bodies: Vec::with_capacity(graph.nodes.len()),
            distance: 0.0,
        })
    }

    /// Runs one iteration and returns the total distance the nodes moved.
    ///
    /// ### Parameters
    /// - `graph` - The graph given to [`ForceAtlas2::new`]; its node
    ///   positions are updated in place.
    pub fn step(&mut self, graph: &mut Graph) -> Result<f64> {
        let expected = (self.data.len(), self.edges.len());
        let found = (graph.nodes.len(), graph.edges.len());
        if expected != found {
            return Err(Error::GraphShapeChanged { expected, found });
        }

        phases::swap_phase(&self.pool, &mut self.data)?;
        phases::collect_bodies(
            &graph.nodes,
            &self.data,
            self.config.dimensions,
            &mut self.bodies,
        );

        let tree_update = phases::maintain_tree(
            &self.pool,
            &mut self.tree,
            &self.bodies,
            &self.config,
            self.state.step,
        )?;

        phases::repulsion_gravity_phase(
            &self.pool,
            &mut self.data,
            &graph.nodes,
            &self.bodies,
            &self.model,
            self.tree.as_ref(),
            self.config.barnes_hut_theta,
        )?;

        phases::attraction_phase(
            &self.pool,
            &mut self.buffers,
            &self.bodies,
            &self.edges,
            &self.model.attraction,
        )?;
        phases::reduce_phase(&self.pool, &mut self.data, &self.buffers)?;

        let (swinging, traction) = phases::speed_phase(&self.pool, &self.data, &graph.nodes)?;
        let update = self.state.adjust(
            swinging,
            traction,
            self.data.len(),
            self.config.jitter_tolerance,
        );

        self.distance = phases::integrate_phase(
            &self.pool,
            &mut graph.nodes,
            &self.data,
            self.integration,
            self.state.speed,
            self.config.dimensions,
        )?;

        debug!(
            step = self.state.step,
            ?tree_update,
            speed = self.state.speed,
            efficiency = self.state.speed_efficiency,
            swinging = update.swinging,
            traction = update.traction,
            erratic = update.erratic,
            distance = self.distance,
            "step finished"
        );
        self.state.step += 1;
        Ok(self.distance)
    }

    /// Distance moved by the last step.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn speed(&self) -> f64 {
        self.state.speed
    }

    pub fn speed_efficiency(&self) -> f64 {
        self.state.speed_efficiency
    }

    /// Number of completed steps.
    pub fn step_count(&self) -> u64 {
        self.state.step
    }

    pub fn run_state(&self) -> &RunState {
        &self.state
    }

    pub fn layout_data(&self) -> &[LayoutData] {
        &self.data
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn force_model(&self) -> &ForceModel {
        &self.model
    }

    /// The region tree of the last step, if Barnes-Hut is on.
    pub fn tree(&self) -> Option<&RegionTree> {
        self.tree.as_ref()
    }

    pub fn node_count(&self) -> usize {
        self.data.len()
    }
}

/// Resolves each edge weight and raises it to `edge_weight_influence`.
fn weighted_edges(graph: &Graph, config: &Config) -> Result<Vec<WeightedEdge>> {
    let weights = graph.resolve_weights(config.weight_as_of)?;
    let influence = config.edge_weight_influence;

    graph
        .edges
        .iter()
        .zip(weights)
        .enumerate()
        .map(|(id, (e, w))| {
            let weight = if influence == 0.0 {
                1.0
            } else if influence == 1.0 {
                w
            } else {
                w.powf(influence)
            };
            if !weight.is_finite() {
                return Err(Error::InvalidEdgeWeight { edge: id, weight });
            }
            Ok(WeightedEdge {
                source: e.source,
                target: e.target,
                weight,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Dimensions, FailurePolicy};
    use crate::forces::{AttractionKind, Gravity};
    use crate::graph::{Edge, EdgeWeight, Node, WeightSample};
    use glam::DVec3;
    use rand::{SeedableRng, rngs::StdRng};

    fn config() -> Config {
        Config {
            worker_count: 2,
            dimensions: Dimensions::Two,
            ..Config::default()
        }
    }

    fn seeded(graph: Graph, seed: u64) -> Graph {
        seeded_in(graph, seed, Dimensions::Two)
    }

    fn seeded_in(mut graph: Graph, seed: u64, dims: Dimensions) -> Graph {
        let mut rng = StdRng::seed_from_u64(seed);
        graph.seed_positions(&mut rng, dims);
        graph
    }

    fn all_finite(graph: &Graph) -> bool {
        graph.nodes.iter().all(|n| n.position.is_finite())
    }

    fn star(leaves: usize) -> Graph {
        let nodes = vec![Node::at(DVec3::ZERO); leaves + 1];
        let edges = (1..=leaves).map(|i| Edge::new(0, i)).collect();
        seeded(Graph::new(nodes, edges), 7)
    }

    fn separation(graph: &Graph) -> f64 {
        (graph.nodes[0].position - graph.nodes[1].position).length()
    }

    #[test]
    fn masses_are_one_plus_degree_for_the_whole_run() {
        let mut graph = star(5);
        let mut engine = ForceAtlas2::new(&graph, config()).unwrap();
        let degrees = graph.degrees();

        for _ in 0..10 {
            engine.step(&mut graph).unwrap();
        }

        for (d, deg) in engine.layout_data().iter().zip(degrees) {
            assert_eq!(d.mass(), 1.0 + deg as f64);
        }
        assert_eq!(engine.step_count(), 10);
    }

    #[test]
    fn connected_pair_settles_at_a_stable_separation() {
        let nodes = vec![Node::at(DVec3::ZERO); 2];
        let mut graph = seeded(Graph::new(nodes, vec![Edge::new(0, 1)]), 3);
        let cfg = Config {
            gravity: 0.0,
            scaling_ratio: 10.0,
            ..config()
        };
        let mut engine = ForceAtlas2::new(&graph, cfg).unwrap();

        let distances: Vec<f64> = (0..500).map(|_| engine.step(&mut graph).unwrap()).collect();

        // Repulsion 10 * 2 * 2 / d balances attraction d.
        let sep = separation(&graph);
        assert!(sep.is_finite() && sep > 0.0);
        assert!((sep - 40f64.sqrt()).abs() < 0.05, "separation {sep}");

        let first: f64 = distances[..10].iter().sum::<f64>() / 10.0;
        let last: f64 = distances[490..].iter().sum::<f64>() / 10.0;
        assert!(last < 0.1 * first, "first {first}, last {last}");
    }

    #[test]
    fn isolated_node_falls_to_the_origin() {
        let mut graph = seeded(Graph::new(vec![Node::at(DVec3::ZERO)], Vec::new()), 11);
        let start = graph.nodes[0].position.length();
        let mut engine = ForceAtlas2::new(&graph, config()).unwrap();

        for _ in 0..1000 {
            engine.step(&mut graph).unwrap();
        }

        let end = graph.nodes[0].position.length();
        assert!(start > 1.0);
        assert!(end < 1e-2, "still at distance {end}");
    }

    #[test]
    fn overlapping_nodes_are_pushed_apart() {
        let nodes = vec![
            Node::at(DVec3::ZERO).with_size(5.0),
            Node::at(DVec3::new(1.0, 0.5, 0.0)).with_size(5.0),
        ];
        let mut graph = Graph::new(nodes, Vec::new());
        let cfg = Config {
            adjust_sizes: true,
            gravity: 0.0,
            ..config()
        };
        let mut engine = ForceAtlas2::new(&graph, cfg).unwrap();

        let mut previous = separation(&graph);
        for _ in 0..50 {
            engine.step(&mut graph).unwrap();
            let sep = separation(&graph);
            assert!(sep > previous, "separation went from {previous} to {sep}");
            previous = sep;
        }
        assert!(previous > 10.0);
    }

    #[test]
    fn planar_runs_ignore_z_coordinates() {
        let flat = star(6);
        let mut lifted = flat.clone();
        for (i, n) in lifted.nodes.iter_mut().enumerate() {
            n.position.z = 50.0 * i as f64 - 100.0;
        }

        let run = |mut graph: Graph| {
            let mut engine = ForceAtlas2::new(&graph, config()).unwrap();
            let distances: Vec<f64> = (0..30).map(|_| engine.step(&mut graph).unwrap()).collect();
            (graph, distances, engine.speed())
        };
        let (a, da, speed_a) = run(flat);
        let (b, db, speed_b) = run(lifted.clone());

        assert_eq!(speed_a, speed_b);
        assert_eq!(da, db);
        for ((na, nb), before) in a.nodes.iter().zip(&b.nodes).zip(&lifted.nodes) {
            assert_eq!(na.position.truncate(), nb.position.truncate());
            assert_eq!(nb.position.z, before.position.z);
        }
    }

    #[test]
    fn empty_graphs_step_without_work() {
        let mut empty = Graph::default();
        let mut engine = ForceAtlas2::new(&empty, config()).unwrap();
        assert_eq!(engine.step(&mut empty).unwrap(), 0.0);
        assert_eq!(engine.speed(), 1.0);

        let mut loose = seeded(Graph::new(vec![Node::at(DVec3::ZERO); 4], Vec::new()), 1);
        let cfg = Config {
            barnes_hut_optimize: true,
            ..config()
        };
        let mut engine = ForceAtlas2::new(&loose, cfg).unwrap();
        for _ in 0..5 {
            assert!(engine.step(&mut loose).unwrap().is_finite());
        }
        assert!(engine.tree().is_some());
    }

    #[test]
    fn pinned_nodes_never_move() {
        let mut graph = star(4);
        graph.nodes[0].fixed = true;
        graph.nodes[0].position = DVec3::new(100.0, -40.0, 0.0);
        let others: Vec<_> = graph.nodes[1..].iter().map(|n| n.position).collect();
        let mut engine = ForceAtlas2::new(&graph, config()).unwrap();

        for _ in 0..20 {
            engine.step(&mut graph).unwrap();
        }

        assert_eq!(graph.nodes[0].position, DVec3::new(100.0, -40.0, 0.0));
        assert!(
            graph.nodes[1..]
                .iter()
                .zip(others)
                .any(|(n, before)| n.position != before)
        );
    }

    #[test]
    fn step_rejects_a_different_graph() {
        let mut graph = star(3);
        let mut engine = ForceAtlas2::new(&graph, config()).unwrap();
        graph.nodes.push(Node::at(DVec3::ONE));

        match engine.step(&mut graph) {
            Err(Error::GraphShapeChanged { expected, found }) => {
                assert_eq!(expected, (4, 3));
                assert_eq!(found, (5, 3));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn construction_rejects_bad_input() {
        let graph = star(2);
        let cfg = Config {
            scaling_ratio: -1.0,
            ..config()
        };
        assert!(matches!(
            ForceAtlas2::new(&graph, cfg),
            Err(Error::InvalidConfig { field: "scaling_ratio", .. })
        ));

        let mut dangling = star(2);
        dangling.edges.push(Edge::new(0, 9));
        assert!(matches!(
            ForceAtlas2::new(&dangling, config()),
            Err(Error::MissingEndpoint { edge: 2, node: 9 })
        ));

        let mut timed = star(2);
        timed.edges[0].weight = EdgeWeight::Timeline(vec![WeightSample {
            from: 0.0,
            weight: 3.0,
        }]);
        assert!(matches!(
            ForceAtlas2::new(&timed, config()),
            Err(Error::MissingWeightInstant { edge: 0 })
        ));
        let cfg = Config {
            weight_as_of: Some(1.0),
            ..config()
        };
        assert!(ForceAtlas2::new(&timed, cfg).is_ok());
    }

    #[test]
    fn edge_weight_influence_shapes_weights() {
        let mut graph = star(2);
        graph.edges[0] = Edge::weighted(0, 1, 4.0);
        graph.edges[1] = Edge::weighted(0, 2, 9.0);

        let weights = |influence: f64| {
            let cfg = Config {
                edge_weight_influence: influence,
                ..config()
            };
            let engine = ForceAtlas2::new(&graph, cfg).unwrap();
            engine.edges.iter().map(|e| e.weight).collect::<Vec<_>>()
        };

        assert_eq!(weights(0.0), vec![1.0, 1.0]);
        assert_eq!(weights(1.0), vec![4.0, 9.0]);
        let rooted = weights(0.5);
        assert!((rooted[0] - 2.0).abs() < 1e-12 && (rooted[1] - 3.0).abs() < 1e-12);

        graph.edges[0] = Edge::weighted(0, 1, -4.0);
        let cfg = Config {
            edge_weight_influence: 0.5,
            ..config()
        };
        assert!(matches!(
            ForceAtlas2::new(&graph, cfg),
            Err(Error::InvalidEdgeWeight { edge: 0, .. })
        ));
    }

    #[test]
    fn outbound_distribution_uses_mean_mass() {
        let graph = star(3);
        let cfg = Config {
            outbound_attraction_distribution: true,
            ..config()
        };
        let engine = ForceAtlas2::new(&graph, cfg).unwrap();
        // Masses 4, 2, 2, 2.
        assert_eq!(engine.run_state().outbound_compensation, 2.5);
        assert_eq!(engine.force_model().attraction.coefficient, 2.5);
    }

    #[test]
    fn barnes_hut_tracks_the_exhaustive_layout() {
        let nodes = vec![Node::at(DVec3::ZERO); 150];
        let edges = (0..149).map(|i| Edge::new(i, i + 1)).collect();
        let base = seeded(Graph::new(nodes, edges), 21);

        let run = |barnes_hut: bool| {
            let mut graph = base.clone();
            let cfg = Config {
                barnes_hut_optimize: barnes_hut,
                barnes_hut_theta: 0.05,
                worker_count: 3,
                ..config()
            };
            let mut engine = ForceAtlas2::new(&graph, cfg).unwrap();
            for _ in 0..3 {
                engine.step(&mut graph).unwrap();
            }
            graph
        };

        let exact = run(false);
        let approx = run(true);
        let drift: f64 = exact
            .nodes
            .iter()
            .zip(&approx.nodes)
            .map(|(a, b)| (a.position - b.position).length())
            .sum::<f64>()
            / exact.nodes.len() as f64;
        assert!(drift < 1.0, "mean drift {drift}");
    }

    #[test]
    fn barnes_hut_in_3d_tracks_the_exhaustive_layout() {
        let nodes = vec![Node::at(DVec3::ZERO); 120];
        let edges = (0..119).map(|i| Edge::new(i, i + 1)).collect();
        let base = seeded_in(Graph::new(nodes, edges), 5, Dimensions::Three);

        let run = |barnes_hut: bool| {
            let mut graph = base.clone();
            let cfg = Config {
                dimensions: Dimensions::Three,
                barnes_hut_optimize: barnes_hut,
                barnes_hut_theta: 0.05,
                worker_count: 3,
                ..Config::default()
            };
            let mut engine = ForceAtlas2::new(&graph, cfg).unwrap();
            for _ in 0..3 {
                engine.step(&mut graph).unwrap();
            }
            if barnes_hut {
                assert!(engine.tree().is_some_and(|t| t.len() > 1));
            }
            graph
        };

        let exact = run(false);
        let approx = run(true);
        assert!(
            exact
                .nodes
                .iter()
                .zip(&base.nodes)
                .any(|(a, b)| a.position.z != b.position.z)
        );
        let drift: f64 = exact
            .nodes
            .iter()
            .zip(&approx.nodes)
            .map(|(a, b)| (a.position - b.position).length())
            .sum::<f64>()
            / exact.nodes.len() as f64;
        assert!(drift < 1.0, "mean drift {drift}");
    }

    #[test]
    fn capped_integrations_bound_every_step() {
        for (adjust_sizes, alt_speed, expected) in [
            (false, true, Integration::AltSpeed),
            (true, false, Integration::AntiCollision),
        ] {
            let mut graph = star(8);
            for n in &mut graph.nodes {
                n.size = 1.0;
            }
            let cfg = Config {
                adjust_sizes,
                alt_speed,
                ..config()
            };
            let mut engine = ForceAtlas2::new(&graph, cfg).unwrap();
            assert_eq!(engine.integration, expected);

            for _ in 0..100 {
                let distance = engine.step(&mut graph).unwrap();
                assert!(distance.is_finite());
                assert!(distance <= 10.0 * graph.nodes.len() as f64 + 1e-9);
            }
            assert!(all_finite(&graph));
        }
    }

    #[test]
    fn lin_log_mode_changes_the_layout() {
        let run = |lin_log_mode: bool| {
            let mut graph = star(8);
            let cfg = Config {
                lin_log_mode,
                ..config()
            };
            let mut engine = ForceAtlas2::new(&graph, cfg).unwrap();
            for _ in 0..100 {
                engine.step(&mut graph).unwrap();
            }
            (graph, engine.force_model().attraction.kind)
        };

        let (linear, linear_kind) = run(false);
        let (log, log_kind) = run(true);
        assert_eq!(linear_kind, AttractionKind::Linear);
        assert_eq!(log_kind, AttractionKind::Log);
        assert!(all_finite(&log));
        assert!(log.nodes.iter().all(|n| n.position.length() < 1e4));
        assert_ne!(linear, log);
    }

    #[test]
    fn strong_gravity_pulls_the_layout_in() {
        let mut graph = star(8);
        let start = graph
            .nodes
            .iter()
            .map(|n| n.position.length())
            .fold(0.0, f64::max);
        let cfg = Config {
            strong_gravity_mode: true,
            ..config()
        };
        let mut engine = ForceAtlas2::new(&graph, cfg).unwrap();
        assert!(matches!(engine.force_model().gravity, Gravity::Strong { .. }));

        for _ in 0..300 {
            engine.step(&mut graph).unwrap();
        }

        let end = graph
            .nodes
            .iter()
            .map(|n| n.position.length())
            .fold(0.0, f64::max);
        assert!(all_finite(&graph));
        assert!(end < start, "radius went from {start} to {end}");
    }

    #[test]
    fn pool_follows_the_configuration() {
        let graph = star(2);
        let cfg = Config {
            failure_policy: FailurePolicy::FailFast,
            ..config()
        };
        let engine = ForceAtlas2::new(&graph, cfg).unwrap();
        assert_eq!(engine.pool.policy(), FailurePolicy::FailFast);
        assert_eq!(engine.buffers.len(), engine.pool.workers());
    }
}
