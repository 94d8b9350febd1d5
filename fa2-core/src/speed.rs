//! Global adaptive speed.
//!
//! After the force phases, the engine measures how much the layout swings
//! (changes direction) versus how much it moves consistently (traction) and
//! derives the global speed used by the next position update.

const MIN_SPEED_EFFICIENCY: f64 = 0.05;
/// Largest relative change of `speed` per step, in either direction.
const MAX_RISE: f64 = 0.5;
/// Lower bound of the swinging/traction ratio used for the target speed.
/// Without it a lone node under gravity speeds up past the origin on every
/// consistent step and never settles.
const MIN_SWINGING_RATIO: f64 = 0.001;
const MAX_JITTER_TOLERANCE: f64 = 10.0;

/// Mutable state carried from step to step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunState {
    pub speed: f64,
    pub speed_efficiency: f64,
    /// Mean node mass, used as the attraction coefficient under outbound
    /// attraction distribution.
    pub outbound_compensation: f64,
    pub step: u64,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            speed: 1.0,
            speed_efficiency: 1.0,
            outbound_compensation: 1.0,
            step: 0,
        }
    }
}

/// What one call to [`RunState::adjust`] observed and decided.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeedUpdate {
    pub swinging: f64,
    pub traction: f64,
    /// Effective jitter tolerance for this step.
    pub jitter_tolerance: f64,
    pub target_speed: f64,
    pub erratic: bool,
}

impl RunState {
    /// Updates `speed` and `speed_efficiency` from the step's total
    /// `swinging` and `traction` over the non-pinned nodes.
    ///
    /// The tolerated jitter grows with `sqrt(node_count)` and with the
    /// traction per squared node count, clamped to
    /// `[sqrt(estimate), 10]` and scaled by the configured tolerance. When
    /// swinging exceeds twice the traction the step is erratic: efficiency
    /// is halved and the tolerance is at least the configured one.
    pub fn adjust(
        &mut self,
        swinging: f64,
        traction: f64,
        node_count: usize,
        jitter_tolerance: f64,
    ) -> SpeedUpdate {
        if node_count == 0 {
            return SpeedUpdate {
                swinging,
                traction,
                jitter_tolerance,
                target_speed: self.speed,
                erratic: false,
            };
        }

        let n = node_count as f64;
        let estimated = 0.05 * n.sqrt();
        let min_jt = estimated.sqrt();
        let mut jt = jitter_tolerance
            * min_jt.max(MAX_JITTER_TOLERANCE.min(estimated * traction / (n * n)));

        let erratic = swinging > 2.0 * traction;
        if erratic {
            if self.speed_efficiency > MIN_SPEED_EFFICIENCY {
                self.speed_efficiency *= 0.5;
            }
            jt = jt.max(jitter_tolerance);
        }

        let denominator = swinging.max(MIN_SWINGING_RATIO * traction);
        let target_speed = if denominator > 0.0 {
            jt * self.speed_efficiency * traction / denominator
        } else {
            self.speed
        };

        if swinging > jt * traction {
            if self.speed_efficiency > MIN_SPEED_EFFICIENCY {
                self.speed_efficiency *= 0.7;
            }
        } else if self.speed < 1000.0 {
            self.speed_efficiency *= 1.3;
        }

        let max_change = MAX_RISE * self.speed;
        self.speed += (target_speed - self.speed).clamp(-max_change, max_change);

        SpeedUpdate {
            swinging,
            traction,
            jitter_tolerance: jt,
            target_speed,
            erratic,
        }
    }
}
