// ================================
// src/lead.rs - lead-vehicle arbitration cascade
// ================================
use crate::control::{kph_int, kph_round, Ramp, RampScheduler};
use crate::state::CruiseMode;

/// Everything the lead guards look at, resolved once per cycle.
#[derive(Debug, Clone)]
pub struct LeadContext {
    pub clu: f64,
    pub vset: f64,
    pub cruise_set: f64,
    /// Active camera/map target (km/h), 0 when none
    pub target: f64,
    pub map_enable: bool,
    pub mode: CruiseMode,
    pub driver_acc: bool,
    pub res_speed: f64,

    // Tracked lead, already truncated to whole m and km/h
    pub d_rel: i32,
    pub lead_spd: i32,
    pub d_delta: i32,
}

impl LeadContext {
    fn clu_int(&self) -> i32 {
        kph_int(self.clu)
    }

    fn clu_round(&self) -> i32 {
        kph_round(self.clu)
    }

    fn vset_int(&self) -> i32 {
        kph_int(self.vset)
    }

    fn target_round(&self) -> i32 {
        kph_round(self.target)
    }

    fn decel_only(&self) -> bool {
        self.mode.is_map_decel_only()
    }

    fn tracking(&self) -> bool {
        1 < self.d_rel && self.d_rel < 149
    }

    /// No camera target, or the camera target still sits above the display.
    fn accel_allowed(&self) -> bool {
        (self.target_round() > self.vset_int() && self.target != 0.0) || self.target == 0.0
    }

    /// Following mode with the driver's cruise speed still above road speed.
    fn below_cruise(&self) -> bool {
        self.mode.follows_lead()
            && self.cruise_set > self.clu_round() as f64
            && !self.decel_only()
    }

    fn closing_ratio(&self, ratio: f64) -> bool {
        self.clu_int() as f64 >= self.d_rel as f64 * ratio
    }
}

/// Which driving scenario produced a lead decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadScenario {
    DriverOverride,
    MapLimit,
    ResumeLimit,
    FastClosing,
    StopGoCreep,
    SlowLeadPulling,
    LeadPullingAway,
    HighSpeedClosing,
    MidSpeedClosing,
    UrbanClosing,
    UrbanShortGap,
    LowSpeedClosing,
    BelowSetSpeed,
    OpenRoadResume,
    Standstill,
    Cruising,
    SteadyFollow,
    TooClose,
    MapDecelResume,
    NoChange,
}

impl LeadScenario {
    /// Diagnostic step code.
    pub fn code(self) -> u8 {
        match self {
            LeadScenario::DriverOverride => 0,
            LeadScenario::MapLimit => 1,
            LeadScenario::ResumeLimit => 2,
            LeadScenario::FastClosing => 3,
            LeadScenario::StopGoCreep => 4,
            LeadScenario::SlowLeadPulling => 5,
            LeadScenario::LeadPullingAway => 6,
            LeadScenario::HighSpeedClosing => 7,
            LeadScenario::MidSpeedClosing => 8,
            LeadScenario::UrbanClosing => 10,
            LeadScenario::UrbanShortGap => 11,
            LeadScenario::LowSpeedClosing => 12,
            LeadScenario::BelowSetSpeed => 13,
            LeadScenario::OpenRoadResume => 14,
            LeadScenario::Standstill => 15,
            LeadScenario::Cruising => 16,
            LeadScenario::SteadyFollow => 17,
            LeadScenario::TooClose => 18,
            LeadScenario::MapDecelResume => 19,
            LeadScenario::NoChange => 20,
        }
    }
}

type Guard = fn(&LeadContext) -> bool;
type Action = fn(&LeadContext, &RampScheduler) -> Option<Ramp>;

pub struct LeadRule {
    pub scenario: LeadScenario,
    guard: Guard,
    action: Action,
}

impl LeadRule {
    pub fn matches(&self, ctx: &LeadContext) -> bool {
        (self.guard)(ctx)
    }
}

/// Guards in priority order; the first one that holds decides the cycle.
#[rustfmt::skip]
pub static LEAD_RULES: [LeadRule; 20] = [
    LeadRule { scenario: LeadScenario::DriverOverride, guard: driver_override, action: follow_driver },
    LeadRule { scenario: LeadScenario::MapLimit, guard: map_limit, action: ramp_to_map_limit },
    LeadRule { scenario: LeadScenario::ResumeLimit, guard: resume_limit, action: ramp_to_resume_limit },
    LeadRule { scenario: LeadScenario::FastClosing, guard: fast_closing, action: brake_for_fast_lead },
    LeadRule { scenario: LeadScenario::StopGoCreep, guard: stop_go_creep, action: creep_forward },
    LeadRule { scenario: LeadScenario::SlowLeadPulling, guard: slow_lead_pulling, action: accel_gently },
    LeadRule { scenario: LeadScenario::LeadPullingAway, guard: lead_pulling_away, action: accel_follow },
    LeadRule { scenario: LeadScenario::HighSpeedClosing, guard: high_speed_closing, action: decel_high_speed },
    LeadRule { scenario: LeadScenario::MidSpeedClosing, guard: mid_speed_closing, action: decel_mid_speed },
    LeadRule { scenario: LeadScenario::UrbanClosing, guard: urban_closing, action: decel_urban },
    LeadRule { scenario: LeadScenario::UrbanShortGap, guard: urban_short_gap, action: decel_step },
    LeadRule { scenario: LeadScenario::LowSpeedClosing, guard: low_speed_closing, action: decel_low_speed },
    LeadRule { scenario: LeadScenario::BelowSetSpeed, guard: below_set_speed, action: decel_step },
    LeadRule { scenario: LeadScenario::OpenRoadResume, guard: open_road_resume, action: accel_gently },
    LeadRule { scenario: LeadScenario::Standstill, guard: standstill, action: hold },
    LeadRule { scenario: LeadScenario::Cruising, guard: LeadContext::below_cruise, action: hold },
    LeadRule { scenario: LeadScenario::SteadyFollow, guard: steady_follow, action: hold },
    LeadRule { scenario: LeadScenario::TooClose, guard: too_close, action: decel_too_close },
    LeadRule { scenario: LeadScenario::MapDecelResume, guard: map_decel_resume, action: accel_to_map_limit },
    LeadRule { scenario: LeadScenario::NoChange, guard: always, action: hold },
];

fn driver_override(c: &LeadContext) -> bool {
    c.driver_acc && !c.decel_only()
}

fn map_limit(c: &LeadContext) -> bool {
    let target = c.target_round();
    target < c.vset_int()
        && c.map_enable
        && target < kph_round(c.cruise_set)
        && c.target != 0.0
}

fn resume_limit(c: &LeadContext) -> bool {
    c.res_speed != 0.0 && c.res_speed < c.vset_int() as f64
}

fn fast_closing(c: &LeadContext) -> bool {
    c.mode.follows_lead() && 6 < c.d_rel && c.d_rel < 149 && c.lead_spd < -23 && !c.decel_only()
}

fn stop_go_creep(c: &LeadContext) -> bool {
    c.below_cruise()
        && 3 < c.d_rel
        && c.d_rel < 10
        && c.lead_spd <= 0
        && 1 < c.clu_int()
        && c.clu_int() <= 7
        && c.vset < 45.0
        && c.accel_allowed()
}

fn slow_lead_pulling(c: &LeadContext) -> bool {
    c.below_cruise()
        && 3 < c.d_rel
        && c.d_rel < 20
        && c.lead_spd > 5
        && c.clu <= 25.0
        && c.vset < 55.0
        && c.accel_allowed()
}

fn lead_pulling_away(c: &LeadContext) -> bool {
    c.below_cruise()
        && c.lead_spd > 0
        && c.clu_int().saturating_add(c.lead_spd) >= c.vset_int()
        && kph_int(c.clu * 0.35) < c.d_rel
        && c.d_rel < 149
        && c.accel_allowed()
}

fn high_speed_closing(c: &LeadContext) -> bool {
    c.below_cruise()
        && c.clu > 80.0
        && c.lead_spd < -4
        && c.clu_int() <= c.vset_int()
        && c.closing_ratio(1.7)
        && c.tracking()
}

fn mid_speed_closing(c: &LeadContext) -> bool {
    c.below_cruise()
        && c.clu > 65.0
        && c.lead_spd < -4
        && c.clu_int() <= c.vset_int()
        && c.closing_ratio(1.9)
        && c.tracking()
}

fn urban_closing(c: &LeadContext) -> bool {
    c.below_cruise()
        && 30.0 < c.clu
        && c.clu < 65.0
        && c.lead_spd < -3
        && c.clu_int() <= c.vset_int()
        && c.closing_ratio(0.85)
        && c.tracking()
}

fn urban_short_gap(c: &LeadContext) -> bool {
    c.below_cruise()
        && 30.0 < c.clu
        && c.clu < 65.0
        && c.lead_spd <= 0
        && c.clu_int().saturating_add(3) < c.vset_int()
        && c.closing_ratio(0.85)
        && c.tracking()
}

fn low_speed_closing(c: &LeadContext) -> bool {
    c.below_cruise() && 7 < c.clu_int() && c.clu_int() < 30 && c.lead_spd < 0 && c.vset > 30.0
}

fn below_set_speed(c: &LeadContext) -> bool {
    c.below_cruise()
        && c.lead_spd <= 0
        && c.clu_int().saturating_add(5) <= c.vset_int()
        && c.clu_int() > 40
        && c.tracking()
}

fn open_road_resume(c: &LeadContext) -> bool {
    c.below_cruise()
        && c.d_delta == 0
        && c.lead_spd == 0
        && c.cruise_set > c.vset_int() as f64
        && c.d_rel > 149
        && c.accel_allowed()
}

fn standstill(c: &LeadContext) -> bool {
    c.below_cruise() && c.lead_spd == 0 && c.clu_int() == 0 && c.d_rel <= 6
}

fn steady_follow(c: &LeadContext) -> bool {
    c.mode.follows_lead()
        && c.lead_spd >= 0
        && c.clu >= c.vset_int() as f64
        && kph_int(c.clu * 0.5) < c.d_rel
        && c.d_rel < 149
        && !c.decel_only()
}

fn too_close(c: &LeadContext) -> bool {
    c.mode.follows_lead()
        && c.lead_spd < 0
        && kph_int(c.clu * 0.5) >= c.d_rel
        && c.d_rel > 1
        && !c.decel_only()
}

fn map_decel_resume(c: &LeadContext) -> bool {
    (c.decel_only() || c.mode == CruiseMode::Curv)
        && c.cruise_set > kph_round(c.vset) as f64
        && c.accel_allowed()
}

fn always(_: &LeadContext) -> bool {
    true
}

fn hold(_: &LeadContext, _: &RampScheduler) -> Option<Ramp> {
    None
}

fn follow_driver(c: &LeadContext, _: &RampScheduler) -> Option<Ramp> {
    let floor = c.clu_round().saturating_add(2);
    (c.vset_int() < floor).then(|| Ramp::new(15, floor as f64))
}

fn ramp_to_map_limit(c: &LeadContext, r: &RampScheduler) -> Option<Ramp> {
    Some(r.bounded(c.vset, c.clu, 10, -1, c.target_round() as f64))
}

fn ramp_to_resume_limit(c: &LeadContext, r: &RampScheduler) -> Option<Ramp> {
    Some(r.bounded(c.vset, c.clu, 8, -1, c.res_speed))
}

fn brake_for_fast_lead(c: &LeadContext, r: &RampScheduler) -> Option<Ramp> {
    let wait = (c.d_rel as i64 - 25).max(10);
    Some(r.step(c.vset, c.clu, wait, -10))
}

fn creep_forward(c: &LeadContext, r: &RampScheduler) -> Option<Ramp> {
    Some(r.bounded(c.vset, c.clu, 8, 5, c.cruise_set))
}

fn accel_gently(c: &LeadContext, r: &RampScheduler) -> Option<Ramp> {
    Some(r.bounded(c.vset, c.clu, 50, 1, c.cruise_set))
}

fn accel_follow(c: &LeadContext, r: &RampScheduler) -> Option<Ramp> {
    Some(r.bounded(c.vset, c.clu, 20, 1, c.cruise_set))
}

fn decel_high_speed(c: &LeadContext, r: &RampScheduler) -> Option<Ramp> {
    let wait = (70 + c.lead_spd as i64 * 2).max(20);
    Some(r.step(c.vset, c.clu, wait, -1))
}

fn decel_mid_speed(c: &LeadContext, r: &RampScheduler) -> Option<Ramp> {
    let wait = (80 + c.lead_spd as i64 * 2).max(20);
    Some(r.step(c.vset, c.clu, wait, -1))
}

fn decel_urban(c: &LeadContext, r: &RampScheduler) -> Option<Ramp> {
    let wait = (230 - (c.lead_spd as i64).saturating_pow(3).saturating_abs()).max(15);
    Some(r.step(c.vset, c.clu, wait, -1))
}

fn decel_step(c: &LeadContext, r: &RampScheduler) -> Option<Ramp> {
    Some(r.step(c.vset, c.clu, 15, -1))
}

fn decel_low_speed(c: &LeadContext, r: &RampScheduler) -> Option<Ramp> {
    Some(r.step(c.vset, c.clu, 15, -5))
}

fn decel_too_close(c: &LeadContext, r: &RampScheduler) -> Option<Ramp> {
    Some(r.step(c.vset, c.clu, 50, -1))
}

fn accel_to_map_limit(c: &LeadContext, r: &RampScheduler) -> Option<Ramp> {
    let limit = if c.target > 0.0 {
        c.cruise_set.min(c.target)
    } else {
        c.cruise_set
    };
    Some(r.bounded(c.vset, c.clu, 30, 1, limit))
}

/// Walks [`LEAD_RULES`] top-down.
pub struct LeadArbitrationRule {
    ramp: RampScheduler,
}

impl LeadArbitrationRule {
    pub fn new(ramp: RampScheduler) -> Self {
        Self { ramp }
    }

    /// Returns the scenario that fired and its ramp, `None` meaning hold.
    pub fn evaluate(&self, ctx: &LeadContext) -> (LeadScenario, Option<Ramp>) {
        LEAD_RULES
            .iter()
            .find(|rule| rule.matches(ctx))
            .map(|rule| (rule.scenario, (rule.action)(ctx, &self.ramp)))
            .unwrap_or((LeadScenario::NoChange, None))
    }
}
