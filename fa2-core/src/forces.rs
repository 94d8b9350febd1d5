//! Force formulas: repulsion, gravity and attraction.
//!
//! Every formula takes explicit [`Body`] data and returns the displacement
//! to add to the first body. Pairwise forces are symmetric: the second body
//! receives the exact negation, which [`apply_pair`] does for callers that own
//! both accumulators.
//!
//! The variant of each family is chosen once per run by
//! [`ForceModel::from_config`]; all of them are closed enums, so a step never
//! goes through dynamic dispatch.
//!
//! Throughout, `factor` is force divided by distance, so the displacement is
//! the separation vector times `factor`.

use crate::config::Config;
use glam::DVec3;

/// Position, radius and mass of a node or aggregate, as seen by a formula.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Body {
    pub position: DVec3,
    pub size: f64,
    pub mass: f64,
}

impl Body {
    pub fn new(position: DVec3, size: f64, mass: f64) -> Self {
        Self {
            position,
            size,
            mass,
        }
    }
}

/// Adds `d` to `da` and its negation to `db`.
#[inline]
pub fn apply_pair(d: DVec3, da: &mut DVec3, db: &mut DVec3) {
    *da += d;
    *db -= d;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Repulsion {
    /// Inverse-distance repulsion between point masses.
    Linear { coefficient: f64 },
    /// Repulsion between sized bodies; overlapping bodies are pushed apart
    /// with a strong fixed factor.
    AntiCollision { coefficient: f64 },
}

impl Repulsion {
    /// Displacement of `a` caused by `b`.
    #[inline]
    pub fn between(&self, a: &Body, b: &Body) -> DVec3 {
        let d = a.position - b.position;
        let distance = d.length();
        match *self {
            Repulsion::Linear { coefficient } => {
                if distance > 0.0 {
                    d * (coefficient * a.mass * b.mass / distance / distance)
                } else {
                    DVec3::ZERO
                }
            }
            Repulsion::AntiCollision { coefficient } => {
                let gap = distance - a.size - b.size;
                if gap > 0.0 {
                    d * (coefficient * a.mass * b.mass / gap / gap)
                } else if gap < 0.0 {
                    d * (100.0 * coefficient * a.mass * b.mass)
                } else {
                    DVec3::ZERO
                }
            }
        }
    }

    /// One-sided displacement of `body` caused by an aggregate of total
    /// `mass` centered at `center`.
    ///
    /// Aggregates have no surface, so both variants use the point formula.
    #[inline]
    pub fn from_region(&self, body: &Body, center: DVec3, mass: f64) -> DVec3 {
        let coefficient = match *self {
            Repulsion::Linear { coefficient } | Repulsion::AntiCollision { coefficient } => {
                coefficient
            }
        };
        let d = body.position - center;
        let distance = d.length();
        if distance > 0.0 {
            d * (coefficient * body.mass * mass / distance / distance)
        } else {
            DVec3::ZERO
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Gravity {
    /// Constant-magnitude pull toward the origin.
    Linear { coefficient: f64 },
    /// Pull proportional to the distance from the origin.
    Strong { coefficient: f64 },
}

impl Gravity {
    /// One-sided displacement pulling `body` toward the origin with strength `g`.
    #[inline]
    pub fn pull(&self, body: &Body, g: f64) -> DVec3 {
        let p = body.position;
        let distance = p.length();
        if distance <= 0.0 {
            return DVec3::ZERO;
        }
        match *self {
            Gravity::Linear { coefficient } => -p * (coefficient * body.mass * g / distance),
            Gravity::Strong { coefficient } => -p * (coefficient * body.mass * g),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttractionKind {
    Linear,
    LinearMassDistributed,
    Log,
    LogMassDistributed,
    LinearAntiCollision,
    LinearMassDistributedAntiCollision,
    LogAntiCollision,
    LogMassDistributedAntiCollision,
}

impl AttractionKind {
    /// Picks the formula from the three behavior switches.
    pub fn select(adjust_sizes: bool, lin_log: bool, mass_distributed: bool) -> Self {
        use AttractionKind::*;
        match (adjust_sizes, lin_log, mass_distributed) {
            (false, false, false) => Linear,
            (false, false, true) => LinearMassDistributed,
            (false, true, false) => Log,
            (false, true, true) => LogMassDistributed,
            (true, false, false) => LinearAntiCollision,
            (true, false, true) => LinearMassDistributedAntiCollision,
            (true, true, false) => LogAntiCollision,
            (true, true, true) => LogMassDistributedAntiCollision,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attraction {
    pub kind: AttractionKind,
    pub coefficient: f64,
}

impl Attraction {
    /// Displacement of `a` along the edge `a -> b` of weight `weight`.
    ///
    /// Mass-distributed variants divide by the mass of `a`, the source.
    #[inline]
    pub fn between(&self, a: &Body, b: &Body, weight: f64) -> DVec3 {
        use AttractionKind::*;
        let c = self.coefficient;
        let d = a.position - b.position;
        let factor = match self.kind {
            Linear => -c * weight,
            LinearMassDistributed => -c * weight / a.mass,
            Log => {
                let distance = d.length();
                if distance > 0.0 {
                    -c * weight * distance.ln_1p() / distance
                } else {
                    0.0
                }
            }
            LogMassDistributed => {
                let distance = d.length();
                if distance > 0.0 {
                    -c * weight * distance.ln_1p() / distance / a.mass
                } else {
                    0.0
                }
            }
            LinearAntiCollision => {
                if gap(a, b, d) > 0.0 {
                    -c * weight
                } else {
                    0.0
                }
            }
            LinearMassDistributedAntiCollision => {
                if gap(a, b, d) > 0.0 {
                    -c * weight / a.mass
                } else {
                    0.0
                }
            }
            LogAntiCollision => {
                let distance = gap(a, b, d);
                if distance > 0.0 {
                    -c * weight * distance.ln_1p() / distance
                } else {
                    0.0
                }
            }
            LogMassDistributedAntiCollision => {
                let distance = gap(a, b, d);
                if distance > 0.0 {
                    -c * weight * distance.ln_1p() / distance / a.mass
                } else {
                    0.0
                }
            }
        };
        d * factor
    }
}

/// Distance between the two surfaces.
#[inline]
fn gap(a: &Body, b: &Body, d: DVec3) -> f64 {
    d.length() - a.size - b.size
}

/// The force variants of one run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ForceModel {
    pub repulsion: Repulsion,
    pub gravity: Gravity,
    /// Strength handed to [`Gravity::pull`].
    pub gravity_strength: f64,
    pub attraction: Attraction,
}

impl ForceModel {
    /// Selects every variant from the configuration.
    ///
    /// `outbound_compensation` is the mean node mass; it becomes the
    /// attraction coefficient when outbound attraction distribution is on.
    pub fn from_config(cfg: &Config, outbound_compensation: f64) -> Self {
        let scaling = cfg.scaling_ratio;
        let repulsion = if cfg.adjust_sizes {
            Repulsion::AntiCollision {
                coefficient: scaling,
            }
        } else {
            Repulsion::Linear {
                coefficient: scaling,
            }
        };
        let gravity = if cfg.strong_gravity_mode {
            Gravity::Strong {
                coefficient: scaling,
            }
        } else {
            Gravity::Linear {
                coefficient: scaling,
            }
        };
        let coefficient = if cfg.outbound_attraction_distribution {
            outbound_compensation
        } else {
            1.0
        };

        Self {
            repulsion,
            gravity,
            gravity_strength: cfg.gravity / scaling,
            attraction: Attraction {
                kind: AttractionKind::select(
                    cfg.adjust_sizes,
                    cfg.lin_log_mode,
                    cfg.outbound_attraction_distribution,
                ),
                coefficient,
            },
        }
    }
}
