//! Run configuration for the layout engine.
//!
//! A [`Config`] is fixed for the duration of a run: the engine copies it at
//! construction and only ever reads it afterwards. Use
//! [`Config::for_node_count`] to get the size-dependent defaults, then
//! override individual fields.

use crate::error::{Error, Result};
use tracing::warn;

/// Number of spatial axes the layout runs in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Dimensions {
    Two,
    #[default]
    Three,
}

impl Dimensions {
    /// Number of children a region can split into (quad-tree or oct-tree).
    pub fn branch_factor(self) -> usize {
        match self {
            Dimensions::Two => 4,
            Dimensions::Three => 8,
        }
    }

    pub fn is_3d(self) -> bool {
        matches!(self, Dimensions::Three)
    }
}

/// What the engine does when a worker task panics inside a parallel phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the step and return [`Error::WorkerPanicked`].
    #[default]
    FailFast,
    /// Log the panic and continue with the contributions of the remaining
    /// tasks. The step is silently under-computed.
    BestEffort,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// Repulsion strength. Larger values give a sparser layout.
    pub scaling_ratio: f64,
    /// Pull toward the origin.
    pub gravity: f64,
    /// Gravity that does not decay with distance.
    pub strong_gravity_mode: bool,
    /// Divide attraction by the source node's mass so hubs pull less per edge.
    pub outbound_attraction_distribution: bool,
    /// Logarithmic attraction (tighter clusters).
    pub lin_log_mode: bool,
    /// Treat node sizes as physical radii and prevent overlap.
    pub adjust_sizes: bool,
    /// Exponent applied to edge weights. 0 ignores weights.
    pub edge_weight_influence: f64,
    /// How much swinging is tolerated before the global speed is lowered.
    pub jitter_tolerance: f64,
    pub barnes_hut_optimize: bool,
    pub barnes_hut_theta: f64,
    /// Rebuild the region tree every this many steps.
    pub tree_refresh_interval: u64,
    /// On steps between rebuilds, recompute region centers and masses.
    pub refresh_center_when_not_rebuilding: bool,
    /// Worker pool size. 0 is floored to 1.
    pub worker_count: usize,
    /// Levels of the region tree split level by level before the per-subtree
    /// parallel build. `None` derives it from the worker count.
    pub tree_split_rounds: Option<usize>,
    pub dimensions: Dimensions,
    /// Alternative node speed from the ForceAtlas2 paper (step length capped at 10).
    pub alt_speed: bool,
    pub failure_policy: FailurePolicy,
    /// Instant at which time-varying edge weights are read for the whole run.
    pub weight_as_of: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scaling_ratio: 10.0,
            gravity: 1.0,
            strong_gravity_mode: false,
            outbound_attraction_distribution: false,
            lin_log_mode: false,
            adjust_sizes: false,
            edge_weight_influence: 1.0,
            jitter_tolerance: 1.0,
            barnes_hut_optimize: false,
            barnes_hut_theta: 1.2,
            tree_refresh_interval: 1,
            refresh_center_when_not_rebuilding: true,
            worker_count: default_worker_count(),
            tree_split_rounds: None,
            dimensions: Dimensions::default(),
            alt_speed: false,
            failure_policy: FailurePolicy::default(),
            weight_as_of: None,
        }
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Config {
    /// Defaults tuned for a graph of `node_count` nodes.
    ///
    /// Small graphs get a stronger repulsion; Barnes-Hut is switched on from
    /// 1000 nodes upward.
    pub fn for_node_count(node_count: usize) -> Self {
        Self {
            scaling_ratio: if node_count < 100 { 10.0 } else { 2.0 },
            barnes_hut_optimize: node_count >= 1000,
            ..Self::default()
        }
    }

    /// Checks every tunable and returns the normalized configuration.
    ///
    /// The only value that is silently corrected is `worker_count`, which is
    /// floored to 1.
    pub fn validate(&self) -> Result<Config> {
        let mut cfg = *self;

        check_finite("scaling_ratio", cfg.scaling_ratio)?;
        if cfg.scaling_ratio <= 0.0 {
            return Err(invalid("scaling_ratio", "must be positive"));
        }
        check_finite("gravity", cfg.gravity)?;
        if cfg.gravity < 0.0 {
            return Err(invalid("gravity", "must not be negative"));
        }
        check_finite("edge_weight_influence", cfg.edge_weight_influence)?;
        check_finite("jitter_tolerance", cfg.jitter_tolerance)?;
        if cfg.jitter_tolerance <= 0.0 {
            return Err(invalid("jitter_tolerance", "must be positive"));
        }
        check_finite("barnes_hut_theta", cfg.barnes_hut_theta)?;
        if cfg.barnes_hut_theta < 0.0 {
            return Err(invalid("barnes_hut_theta", "must not be negative"));
        }
        if cfg.tree_refresh_interval == 0 {
            return Err(invalid("tree_refresh_interval", "must be at least 1"));
        }
        if cfg.tree_split_rounds == Some(0) {
            return Err(invalid("tree_split_rounds", "must be at least 1"));
        }
        if let Some(t) = cfg.weight_as_of {
            check_finite("weight_as_of", t)?;
        }

        if cfg.worker_count == 0 {
            warn!("worker_count was 0, using a single worker");
            cfg.worker_count = 1;
        }

        Ok(cfg)
    }

    /// Number of level-synchronous split rounds used when building the region tree.
    ///
    /// Enough rounds that the frontier holds at least one region per worker:
    /// `floor(ln(workers) / ln(branch) + 0.02) + 1`.
    pub fn split_rounds(&self) -> usize {
        if let Some(rounds) = self.tree_split_rounds {
            return rounds;
        }
        let workers = self.worker_count.max(1) as f64;
        let branch = self.dimensions.branch_factor() as f64;
        (workers.ln() / branch.ln() + 0.02).floor() as usize + 1
    }
}

fn invalid(field: &'static str, reason: &'static str) -> Error {
    Error::InvalidConfig { field, reason }
}

fn check_finite(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, "must be finite"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_count_drives_scaling_and_barnes_hut_defaults() {
        let small = Config::for_node_count(50);
        assert_eq!(small.scaling_ratio, 10.0);
        assert!(!small.barnes_hut_optimize);

        let medium = Config::for_node_count(100);
        assert_eq!(medium.scaling_ratio, 2.0);
        assert!(!medium.barnes_hut_optimize);

        let large = Config::for_node_count(1000);
        assert_eq!(large.scaling_ratio, 2.0);
        assert!(large.barnes_hut_optimize);
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.gravity, 1.0);
        assert_eq!(cfg.edge_weight_influence, 1.0);
        assert_eq!(cfg.jitter_tolerance, 1.0);
        assert_eq!(cfg.barnes_hut_theta, 1.2);
        assert_eq!(cfg.tree_refresh_interval, 1);
        assert!(cfg.refresh_center_when_not_rebuilding);
        assert!(cfg.worker_count >= 1);
        assert!(!cfg.strong_gravity_mode);
        assert!(!cfg.lin_log_mode);
        assert!(!cfg.adjust_sizes);
        assert!(!cfg.alt_speed);
    }

    #[test]
    fn zero_workers_is_floored_to_one() {
        let cfg = Config {
            worker_count: 0,
            ..Config::default()
        };
        let normalized = cfg.validate().unwrap();
        assert_eq!(normalized.worker_count, 1);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cases = [
            Config {
                scaling_ratio: 0.0,
                ..Config::default()
            },
            Config {
                gravity: -1.0,
                ..Config::default()
            },
            Config {
                jitter_tolerance: 0.0,
                ..Config::default()
            },
            Config {
                barnes_hut_theta: -0.5,
                ..Config::default()
            },
            Config {
                tree_refresh_interval: 0,
                ..Config::default()
            },
            Config {
                tree_split_rounds: Some(0),
                ..Config::default()
            },
            Config {
                edge_weight_influence: f64::NAN,
                ..Config::default()
            },
        ];

        for cfg in cases {
            assert!(
                matches!(cfg.validate(), Err(Error::InvalidConfig { .. })),
                "expected rejection for {cfg:?}"
            );
        }
    }

    #[test]
    fn split_rounds_follow_worker_count_and_branch_factor() {
        let mut cfg = Config {
            dimensions: Dimensions::Two,
            worker_count: 1,
            ..Config::default()
        };
        assert_eq!(cfg.split_rounds(), 1);

        cfg.worker_count = 4;
        assert_eq!(cfg.split_rounds(), 2);

        cfg.worker_count = 16;
        assert_eq!(cfg.split_rounds(), 3);

        cfg.dimensions = Dimensions::Three;
        cfg.worker_count = 8;
        assert_eq!(cfg.split_rounds(), 2);

        cfg.tree_split_rounds = Some(5);
        assert_eq!(cfg.split_rounds(), 5);
    }
}
