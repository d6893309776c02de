// ================================
// src/curve.rs - curvature slow-down ahead of sharp bends
// ================================
use crate::control::{kph_int, Ramp};
use crate::state::{LaneChangeState, VehicleState};

/// Camera speed used when no camera/map limit is active (km/h).
const NO_CAMERA_LIMIT: f64 = 255.0;

/// Minimum road speed before the curve cascade acts (km/h).
const MIN_CLUSTER_SPEED: f64 = 40.0;

/// Radar lead must be at least this far away (m).
const MIN_LEAD_DISTANCE: f64 = 15.0;

/// One curvature speed band.
#[derive(Debug, Clone, Copy)]
pub struct CurveBand {
    /// Curvature-implied safe speed that triggers the band (km/h)
    pub threshold: f64,
    /// Whether a safe speed exactly on `threshold + hold` triggers
    pub inclusive: bool,
    pub ceiling: f64,
    /// Share of cluster speed taken off the cruise set speed
    pub fraction: f64,
    pub wait: u32,
    /// Extra threshold while the band's latch is armed
    pub margin: u32,
    pub code: u8,
}

impl CurveBand {
    fn triggered(&self, curve_speed: f64, hold: u32) -> bool {
        let limit = self.threshold + hold as f64;
        if self.inclusive {
            curve_speed <= limit
        } else {
            curve_speed < limit
        }
    }
}

/// Sharpest band first.
#[rustfmt::skip]
pub const CURVE_BANDS: [CurveBand; 5] = [
    CurveBand { threshold: 35.0, inclusive: true, ceiling: 40.0, fraction: 0.2, wait: 15, margin: 9, code: 35 },
    CurveBand { threshold: 45.0, inclusive: false, ceiling: 45.0, fraction: 0.15, wait: 30, margin: 10, code: 34 },
    CurveBand { threshold: 60.0, inclusive: false, ceiling: 60.0, fraction: 0.1, wait: 45, margin: 10, code: 33 },
    CurveBand { threshold: 75.0, inclusive: false, ceiling: 75.0, fraction: 0.075, wait: 60, margin: 10, code: 32 },
    CurveBand { threshold: 90.0, inclusive: false, ceiling: 90.0, fraction: 0.05, wait: 75, margin: 10, code: 31 },
];

/// Per-band hold margins. A non-zero entry raises that band's threshold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurvatureHoldLatch {
    holds: [u32; CURVE_BANDS.len()],
}

impl CurvatureHoldLatch {
    pub fn hold(&self, band: usize) -> u32 {
        self.holds[band]
    }

    pub fn holds(&self) -> &[u32; CURVE_BANDS.len()] {
        &self.holds
    }

    fn arm(&mut self, band: usize) {
        self.holds[band] = CURVE_BANDS[band].margin;
    }

    pub fn reset(&mut self) {
        self.holds = [0; CURVE_BANDS.len()];
    }
}

/// Result of one curve evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveDecision {
    /// Index into [`CURVE_BANDS`] of the band that fired
    pub band: Option<usize>,
    pub ramp: Ramp,
}

pub struct CurveArbitrationRule;

impl CurveArbitrationRule {
    /// Curve cascade only runs on a steady, signalled-straight drive.
    pub fn eligible(vehicle: &VehicleState) -> bool {
        vehicle.mode.follows_curve()
            && vehicle.lane_change == LaneChangeState::Off
            && !vehicle.blinker_on()
    }

    pub fn evaluate(
        &self,
        vehicle: &VehicleState,
        cruise_set: f64,
        camera_target: f64,
        curve_speed: f64,
        latch: &mut CurvatureHoldLatch,
    ) -> CurveDecision {
        let idle = CurveDecision {
            band: None,
            ramp: Ramp::new(0, cruise_set),
        };
        if !Self::eligible(vehicle) {
            return idle;
        }

        let curve_speed = if curve_speed.is_finite() {
            curve_speed
        } else {
            f64::INFINITY
        };
        let cam_speed = if camera_target > 0.0 {
            camera_target
        } else {
            NO_CAMERA_LIMIT
        };
        let clear_road =
            vehicle.clu_vanz > MIN_CLUSTER_SPEED && vehicle.lead_distance >= MIN_LEAD_DISTANCE;

        let fired = CURVE_BANDS
            .iter()
            .enumerate()
            .find(|(i, band)| clear_road && band.triggered(curve_speed, latch.hold(*i)));

        match fired {
            Some((i, band)) => {
                let shaved = cruise_set - kph_int(vehicle.clu_vanz * band.fraction) as f64;
                let speed = cam_speed.min(band.ceiling).min(cruise_set).min(shaved);
                latch.arm(i);
                CurveDecision {
                    band: Some(i),
                    ramp: Ramp::new(band.wait as i64, speed),
                }
            }
            None => {
                latch.reset();
                idle
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CruiseMode;

    fn vehicle(clu: f64, lead_distance: f64) -> VehicleState {
        VehicleState {
            clu_vanz: clu,
            v_set_dis: 80.0,
            mode: CruiseMode::DistCurv,
            lead_distance,
            ..Default::default()
        }
    }

    #[test]
    fn sharp_curve_fires_lowest_band() {
        let mut latch = CurvatureHoldLatch::default();
        let decision = CurveArbitrationRule.evaluate(&vehicle(45.0, 20.0), 80.0, 0.0, 30.0, &mut latch);
        assert_eq!(decision.band, Some(0));
        // min(255, 40, 80, 80 - int(45 * 0.2))
        assert_eq!(decision.ramp, Ramp { wait: 15, speed: 40.0 });
        assert_eq!(latch.hold(0), 9);
    }

    #[test]
    fn armed_band_holds_its_raised_threshold() {
        let mut latch = CurvatureHoldLatch::default();
        let v = vehicle(50.0, 60.0);
        CurveArbitrationRule.evaluate(&v, 80.0, 0.0, 35.0, &mut latch);
        assert_eq!(latch.hold(0), 9);

        let decision = CurveArbitrationRule.evaluate(&v, 80.0, 0.0, 44.0, &mut latch);
        assert_eq!(decision.band, Some(0));

        // Unarmed, 44 would only reach the 45 band.
        let mut fresh = CurvatureHoldLatch::default();
        let decision = CurveArbitrationRule.evaluate(&v, 80.0, 0.0, 44.0, &mut fresh);
        assert_eq!(decision.band, Some(1));
    }

    #[test]
    fn straight_road_resets_every_latch() {
        let mut latch = CurvatureHoldLatch::default();
        let v = vehicle(80.0, 60.0);
        CurveArbitrationRule.evaluate(&v, 100.0, 0.0, 70.0, &mut latch);
        assert_eq!(latch.hold(3), 10);

        let decision = CurveArbitrationRule.evaluate(&v, 100.0, 0.0, 150.0, &mut latch);
        assert_eq!(decision.band, None);
        assert_eq!(decision.ramp, Ramp { wait: 0, speed: 100.0 });
        assert_eq!(latch, CurvatureHoldLatch::default());
    }

    #[test]
    fn camera_limit_caps_the_band() {
        let mut latch = CurvatureHoldLatch::default();
        let decision = CurveArbitrationRule.evaluate(&vehicle(80.0, 60.0), 100.0, 50.0, 85.0, &mut latch);
        assert_eq!(decision.band, Some(4));
        assert_eq!(decision.ramp.speed, 50.0);
        assert_eq!(decision.ramp.wait, 75);
    }

    #[test]
    fn close_lead_suppresses_curve_and_resets() {
        let mut latch = CurvatureHoldLatch::default();
        CurveArbitrationRule.evaluate(&vehicle(60.0, 60.0), 80.0, 0.0, 30.0, &mut latch);
        let decision = CurveArbitrationRule.evaluate(&vehicle(60.0, 10.0), 80.0, 0.0, 30.0, &mut latch);
        assert_eq!(decision.band, None);
        assert_eq!(latch.hold(0), 0);
    }

    #[test]
    fn blinker_skips_without_touching_latches() {
        let mut latch = CurvatureHoldLatch::default();
        CurveArbitrationRule.evaluate(&vehicle(60.0, 60.0), 80.0, 0.0, 30.0, &mut latch);

        let mut v = vehicle(60.0, 60.0);
        v.left_blinker = true;
        let decision = CurveArbitrationRule.evaluate(&v, 80.0, 0.0, 150.0, &mut latch);
        assert_eq!(decision.band, None);
        assert_eq!(latch.hold(0), 9);
    }

    #[test]
    fn non_finite_curvature_is_a_straight_road() {
        let mut latch = CurvatureHoldLatch::default();
        let decision = CurveArbitrationRule.evaluate(&vehicle(60.0, 60.0), 80.0, 0.0, f64::NAN, &mut latch);
        assert_eq!(decision.band, None);
    }

    #[test]
    fn target_never_negative() {
        let mut latch = CurvatureHoldLatch::default();
        let decision = CurveArbitrationRule.evaluate(&vehicle(100.0, 60.0), 5.0, 0.0, 30.0, &mut latch);
        assert_eq!(decision.ramp.speed, 0.0);
    }
}
