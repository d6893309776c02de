// ================================
// src/control.rs - set-speed ramp scheduling
// ================================
use crate::EngineConfig;

/// One arbitration result: wait this many ticks, then head for `speed` (km/h).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ramp {
    pub wait: u32,
    pub speed: f64,
}

impl Ramp {
    pub fn new(wait: i64, speed: f64) -> Self {
        Self {
            wait: wait.clamp(0, u32::MAX as i64) as u32,
            speed: if speed.is_finite() { speed.max(0.0) } else { 0.0 },
        }
    }
}

/// Truncating km/h conversion used by every threshold comparison.
pub(crate) fn kph_int(v: f64) -> i32 {
    v as i32
}

/// Round half to even.
pub(crate) fn kph_round(v: f64) -> i32 {
    v.round_ties_even() as i32
}

// Paces the displayed set speed toward a new target
pub struct RampScheduler {
    config: EngineConfig,
}

impl RampScheduler {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Moves the displayed set speed by `delta` after `base_wait` ticks.
    ///
    /// When the displayed speed is already far on the wrong side of the
    /// cluster speed for the requested direction, the wait stretches to the
    /// slow pacing so the command does not run away from the vehicle.
    pub fn step(&self, set_dis: f64, clu: f64, base_wait: i64, delta: i32) -> Ramp {
        let current = kph_int(set_dis);
        let gap = current.saturating_sub(kph_round(clu));
        let margin = self.config.ramp_safety_margin;

        let stretched = if delta > 0 { gap > margin } else { gap < -margin };
        let wait = if stretched {
            self.config.ramp_slow_wait as i64
        } else {
            base_wait
        };

        Ramp::new(wait, current.saturating_add(delta) as f64)
    }

    /// Like [`step`](Self::step) but never overshoots `bound` and never
    /// moves backwards past the command already in flight.
    pub fn bounded(&self, set_dis: f64, clu: f64, base_wait: i64, delta: i32, bound: f64) -> Ramp {
        let current = kph_int(set_dis) as f64;
        let mut ramp = self.step(set_dis, clu, base_wait, delta);

        ramp.speed = if delta > 0 {
            ramp.speed.min(bound.max(current)).max(current)
        } else {
            ramp.speed.max(bound.min(current)).min(current)
        };
        ramp.speed = ramp.speed.max(0.0);
        ramp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> RampScheduler {
        RampScheduler::new(EngineConfig::default())
    }

    #[test]
    fn step_keeps_base_wait_near_cluster_speed() {
        let ramp = scheduler().step(62.0, 60.0, 20, 1);
        assert_eq!(ramp, Ramp { wait: 20, speed: 63.0 });
    }

    #[test]
    fn accel_far_above_cluster_speed_slows_down() {
        let ramp = scheduler().step(70.0, 60.0, 20, 1);
        assert_eq!(ramp.wait, 100);
        assert_eq!(ramp.speed, 71.0);
    }

    #[test]
    fn decel_far_below_cluster_speed_slows_down() {
        let ramp = scheduler().step(50.0, 60.0, 15, -1);
        assert_eq!(ramp.wait, 100);

        let ramp = scheduler().step(55.0, 60.0, 15, -1);
        assert_eq!(ramp.wait, 15);
    }

    #[test]
    fn speed_never_goes_negative() {
        let ramp = scheduler().step(4.0, 4.0, 10, -10);
        assert_eq!(ramp.speed, 0.0);
    }

    #[test]
    fn bounded_decel_stops_at_bound() {
        let ramp = scheduler().bounded(41.0, 41.0, 10, -10, 40.0);
        assert_eq!(ramp.speed, 40.0);
    }

    #[test]
    fn bounded_accel_does_not_regress() {
        // Displayed speed is already above the bound: hold it, don't pull back.
        let ramp = scheduler().bounded(65.0, 64.0, 20, 1, 60.0);
        assert_eq!(ramp.speed, 65.0);
    }

    #[test]
    fn round_is_half_even() {
        assert_eq!(kph_round(2.5), 2);
        assert_eq!(kph_round(3.5), 4);
        assert_eq!(kph_int(-2.7), -2);
    }
}
