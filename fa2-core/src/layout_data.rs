use glam::DVec3;

/// Per-node simulation state, owned by the engine for the whole run.
///
/// `mass` is fixed at construction (`1 + degree`). `dx` accumulates the
/// forces of the current step and `old_dx` holds the previous step's
/// displacement, used to tell oscillation (swinging) from useful motion
/// (traction).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutData {
    mass: f64,
    pub dx: DVec3,
    pub old_dx: DVec3,
}

impl LayoutData {
    pub fn new(degree: usize) -> Self {
        Self {
            mass: 1.0 + degree as f64,
            dx: DVec3::ZERO,
            old_dx: DVec3::ZERO,
        }
    }

    #[inline]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Moves the current displacement into `old_dx` and clears `dx`.
    #[inline]
    pub fn swap(&mut self) {
        self.old_dx = self.dx;
        self.dx = DVec3::ZERO;
    }

    /// Mass-weighted change of direction between the last two steps.
    #[inline]
    pub fn swinging(&self) -> f64 {
        self.mass * (self.old_dx - self.dx).length()
    }

    /// Mass-weighted consistent motion over the last two steps.
    #[inline]
    pub fn traction(&self) -> f64 {
        self.mass * 0.5 * (self.old_dx + self.dx).length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mass_is_one_plus_degree() {
        assert_eq!(LayoutData::new(0).mass(), 1.0);
        assert_eq!(LayoutData::new(4).mass(), 5.0);
    }

    #[test]
    fn swap_keeps_previous_and_clears_current() {
        let mut d = LayoutData::new(1);
        d.dx = DVec3::new(1.0, -2.0, 3.0);

        d.swap();

        assert_eq!(d.old_dx, DVec3::new(1.0, -2.0, 3.0));
        assert_eq!(d.dx, DVec3::ZERO);
        assert_eq!(d.mass(), 2.0);
    }

    #[test]
    fn reversal_is_all_swinging_and_no_traction() {
        let mut d = LayoutData::new(0);
        d.old_dx = DVec3::new(1.0, 0.0, 0.0);
        d.dx = DVec3::new(-1.0, 0.0, 0.0);

        assert_eq!(d.swinging(), 2.0);
        assert_eq!(d.traction(), 0.0);
    }

    #[test]
    fn steady_motion_is_all_traction() {
        let mut d = LayoutData::new(2);
        d.old_dx = DVec3::new(0.0, 2.0, 0.0);
        d.dx = DVec3::new(0.0, 2.0, 0.0);

        assert_eq!(d.swinging(), 0.0);
        assert_eq!(d.traction(), 6.0);
    }
}
