// ================================
// src/pacer.rs - host-side set-speed pacing
// ================================
use crate::control::Ramp;

/// Displayed set-speed change per paced step (km/h).
const STEP_KPH: f64 = 1.0;

/// Picks the more restrictive of the lead and curve decisions.
///
/// Ties keep the lead decision.
pub fn arbitrate(lead: Ramp, curve: Ramp) -> Ramp {
    if curve.speed < lead.speed {
        curve
    } else {
        lead
    }
}

/// Moves a displayed set speed toward a ramp target one step at a time,
/// waiting `wait` ticks before each step.
#[derive(Debug, Default)]
pub struct SetSpeedPacer {
    timer: u32,
}

impl SetSpeedPacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timer(&self) -> u32 {
        self.timer
    }

    /// Advances one control tick and returns the displayed set speed to command.
    pub fn advance(&mut self, displayed: f64, ramp: Ramp) -> f64 {
        let error = ramp.speed.round() - displayed;
        if error.abs() < STEP_KPH / 2.0 {
            self.timer = 0;
            return displayed;
        }

        self.timer += 1;
        if self.timer < ramp.wait.max(1) {
            return displayed;
        }

        self.timer = 0;
        (displayed + STEP_KPH * error.signum()).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_target_wins() {
        let lead = Ramp { wait: 300, speed: 90.0 };
        let curve = Ramp { wait: 45, speed: 60.0 };
        assert_eq!(arbitrate(lead, curve), curve);
        assert_eq!(arbitrate(lead, Ramp { wait: 0, speed: 90.0 }), lead);
    }

    #[test]
    fn steps_after_wait_elapses() {
        let mut pacer = SetSpeedPacer::new();
        let ramp = Ramp { wait: 3, speed: 62.0 };

        assert_eq!(pacer.advance(60.0, ramp), 60.0);
        assert_eq!(pacer.advance(60.0, ramp), 60.0);
        assert_eq!(pacer.advance(60.0, ramp), 61.0);
        assert_eq!(pacer.timer(), 0);
    }

    #[test]
    fn steps_down_toward_lower_target() {
        let mut pacer = SetSpeedPacer::new();
        let ramp = Ramp { wait: 1, speed: 40.0 };
        assert_eq!(pacer.advance(45.0, ramp), 44.0);
    }

    #[test]
    fn on_target_resets_timer() {
        let mut pacer = SetSpeedPacer::new();
        pacer.advance(60.0, Ramp { wait: 10, speed: 70.0 });
        assert_eq!(pacer.timer(), 1);

        assert_eq!(pacer.advance(70.0, Ramp { wait: 10, speed: 70.0 }), 70.0);
        assert_eq!(pacer.timer(), 0);
    }
}
