// ================================
// src/engine.rs - speed arbitration engine
// ================================
use tracing::{debug, info, warn};

use crate::{
    config::EngineConfig,
    control::{kph_int, kph_round, Ramp, RampScheduler},
    curve::{CurvatureHoldLatch, CurveArbitrationRule, CURVE_BANDS},
    lead::{LeadArbitrationRule, LeadContext, LeadScenario},
    state::{PlanSnapshot, VehicleState, FAR_DISTANCE, MAX_SPEED_KPH},
    vehicle_setup::param_config::{ConfigStore, MAP_ENABLE_KEY, SPEED_LIMIT_OFFSET_KEY},
};

/// Parameter-store values cached between refreshes.
#[derive(Debug, Clone, Default)]
pub struct ConfigCache {
    pub map_enabled: bool,
    pub offset_pct: i64,
    ticks: u32,
    period: u32,
}

impl ConfigCache {
    /// Reads the limit offset once; the map flag waits for the first refresh.
    pub fn load<S: ConfigStore>(store: &S, period: u32) -> Self {
        let offset_pct = store.get_int(SPEED_LIMIT_OFFSET_KEY).unwrap_or_else(|e| {
            warn!("Speed limit offset unavailable, using 0%: {}", e);
            0
        });

        Self {
            map_enabled: false,
            offset_pct,
            ticks: 0,
            period,
        }
    }

    /// Counts one cycle and re-reads the store once the period has run out.
    pub fn tick<S: ConfigStore>(&mut self, store: &S) -> bool {
        self.ticks += 1;
        if self.ticks <= self.period {
            return false;
        }
        self.ticks = 0;
        self.refresh(store);
        true
    }

    fn refresh<S: ConfigStore>(&mut self, store: &S) {
        match store.get_bool(MAP_ENABLE_KEY) {
            Ok(enabled) => {
                if enabled != self.map_enabled {
                    info!("Map speed limit source {}", if enabled { "enabled" } else { "disabled" });
                }
                self.map_enabled = enabled;
            }
            Err(e) => warn!("Keeping cached map flag ({}): {}", self.map_enabled, e),
        }

        match store.get_int(SPEED_LIMIT_OFFSET_KEY) {
            Ok(offset) => {
                if offset != self.offset_pct {
                    info!("Speed limit offset {}% -> {}%", self.offset_pct, offset);
                }
                self.offset_pct = offset;
            }
            Err(e) => warn!("Keeping cached speed limit offset ({}%): {}", self.offset_pct, e),
        }
    }
}

/// What decided the most recent update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecisionTag {
    /// No update has run yet; shows as -1 in the diagnostic line
    #[default]
    Idle,
    Lead(LeadScenario),
    Curve(u8),
    /// Inputs were unusable and the update failed closed
    Rejected,
}

impl DecisionTag {
    pub fn code(self) -> i32 {
        match self {
            DecisionTag::Idle => -1,
            DecisionTag::Lead(scenario) => scenario.code() as i32,
            DecisionTag::Curve(code) => code as i32,
            DecisionTag::Rejected => 99,
        }
    }
}

/// State owned by the engine for the life of the process.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    /// Driver's cruise set speed (km/h)
    pub cruise_set_speed: f64,
    pub curve_latch: CurvatureHoldLatch,
    pub config: ConfigCache,

    // Camera/map limit resolved by the last lead update
    pub map_enable: bool,
    pub target_speed: f64,

    pub last_lead: Option<Ramp>,
    pub last_curve: Option<Ramp>,
    pub last_decision: DecisionTag,
}

pub struct SpeedArbitrationEngine<S: ConfigStore> {
    config: EngineConfig,
    store: S,
    lead_rule: LeadArbitrationRule,
    curve_rule: CurveArbitrationRule,
    state: EngineState,
}

impl<S: ConfigStore> SpeedArbitrationEngine<S> {
    pub fn new(config: EngineConfig, store: S) -> Self {
        let state = EngineState {
            config: ConfigCache::load(&store, config.refresh_period),
            ..Default::default()
        };

        Self {
            lead_rule: LeadArbitrationRule::new(RampScheduler::new(config.clone())),
            curve_rule: CurveArbitrationRule,
            config,
            store,
            state,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Records the driver's dialled cruise speed. Unusable values are ignored.
    pub fn set_cruise_set_speed(&mut self, kph: f64) {
        if kph.is_finite() {
            self.state.cruise_set_speed = kph.clamp(0.0, MAX_SPEED_KPH);
        } else {
            warn!("Ignoring non-finite cruise set speed");
        }
    }

    /// Runs the lead cascade for one control cycle.
    pub fn update_lead(&mut self, vehicle: &VehicleState, plan: &PlanSnapshot) -> Ramp {
        self.state.config.tick(&self.store);

        if !vehicle.speeds_valid() {
            return self.reject("lead");
        }
        let vehicle = vehicle.sanitized();
        let plan = plan.sanitized();

        self.blend_camera_target(&vehicle, &plan);
        let ctx = self.lead_context(&vehicle, &plan);

        let (scenario, ramp) = self.lead_rule.evaluate(&ctx);
        let ramp = ramp.unwrap_or_else(|| {
            Ramp::new(
                self.config.idle_wait as i64,
                kph_round(self.state.cruise_set_speed) as f64,
            )
        });

        self.record(DecisionTag::Lead(scenario));
        self.state.last_lead = Some(ramp);
        ramp
    }

    /// Runs the curvature cascade for one control cycle.
    ///
    /// `curve_speed` is the curvature-implied safe speed ahead (km/h).
    pub fn update_curve(&mut self, vehicle: &VehicleState, curve_speed: f64) -> Ramp {
        if !vehicle.speeds_valid() {
            return self.reject("curve");
        }
        let vehicle = vehicle.sanitized();

        let decision = self.curve_rule.evaluate(
            &vehicle,
            self.state.cruise_set_speed,
            self.state.target_speed,
            curve_speed,
            &mut self.state.curve_latch,
        );
        if let Some(band) = decision.band {
            self.record(DecisionTag::Curve(CURVE_BANDS[band].code));
        }

        self.state.last_curve = Some(decision.ramp);
        decision.ramp
    }

    /// One human-readable status line for the log sink.
    pub fn diagnostic(&self, vehicle: &VehicleState) -> String {
        let lead_wait = self.state.last_lead.map_or(0, |r| r.wait);
        let curve_wait = self.state.last_curve.map_or(0, |r| r.wait);

        format!(
            "MODE={}  BS={}/{}  VL={:03.0}/{:03.0}  TM={:03}/{:03}  TS={:03}  RD=D:{:03.0}/V:{:03.0}  CG={}  DG={}",
            vehicle.mode.code(),
            vehicle.car.mdps_bus,
            vehicle.car.scc_bus,
            self.state.cruise_set_speed,
            vehicle.v_set_dis,
            lead_wait,
            curve_wait,
            kph_round(self.state.target_speed),
            vehicle.lead_distance,
            vehicle.lead_objspd,
            vehicle.cruise_gap,
            self.state.last_decision.code(),
        )
    }

    fn reject(&mut self, which: &str) -> Ramp {
        warn!("Non-finite vehicle speed, holding {} target", which);
        self.record(DecisionTag::Rejected);
        Ramp::new(0, self.state.cruise_set_speed)
    }

    fn record(&mut self, tag: DecisionTag) {
        if tag != self.state.last_decision {
            debug!("Arbitration step {} -> {}", self.state.last_decision.code(), tag.code());
        }
        self.state.last_decision = tag;
    }

    /// Resolves the camera/map limit for this cycle. Anything at or below
    /// the floor means "no limit".
    fn blend_camera_target(&mut self, vehicle: &VehicleState, plan: &PlanSnapshot) {
        let cache = &self.state.config;
        let (source, on_speed_control) = if cache.map_enabled {
            (plan.target_speed_camera, plan.on_speed_control)
        } else {
            (vehicle.safety_sign, vehicle.on_speed_control)
        };
        let camera = (source + kph_round(source * 0.01 * cache.offset_pct as f64) as f64)
            .min(MAX_SPEED_KPH);

        let active = camera > self.config.camera_floor_kph as f64 && on_speed_control;
        self.state.map_enable = active;
        self.state.target_speed = if active { camera } else { 0.0 };
    }

    fn lead_context(&self, vehicle: &VehicleState, plan: &PlanSnapshot) -> LeadContext {
        let (d_rel, v_rel) = resolve_lead(vehicle, plan);

        let follow_distance =
            kph_int(vehicle.clu_vanz * self.config.follow_ratio).min(self.config.max_follow_distance);
        let tracked = 1 < d_rel && d_rel < 149;

        LeadContext {
            clu: vehicle.clu_vanz,
            vset: vehicle.v_set_dis,
            cruise_set: self.state.cruise_set_speed,
            target: self.state.target_speed,
            map_enable: self.state.map_enable,
            mode: vehicle.mode,
            driver_acc: vehicle.driver_acc_time > 0,
            res_speed: vehicle.car.res_speed,
            d_rel,
            lead_spd: if tracked { v_rel } else { 0 },
            d_delta: if tracked { d_rel - follow_distance } else { 0 },
        }
    }
}

/// Planner lead first, radar lead second, otherwise nothing ahead.
fn resolve_lead(vehicle: &VehicleState, plan: &PlanSnapshot) -> (i32, i32) {
    let in_range = |d: f64| 1.0 < d && d < 149.0;

    if in_range(plan.d_rel) {
        (kph_int(plan.d_rel), kph_int(plan.v_rel * 3.6 + 0.5))
    } else if in_range(vehicle.lead_distance) {
        (kph_int(vehicle.lead_distance), kph_int(vehicle.lead_objspd))
    } else {
        (FAR_DISTANCE as i32, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::state::CruiseMode;
    use std::cell::Cell;

    struct FixedStore {
        map_enabled: Cell<bool>,
        offset: i64,
        reads: Cell<u32>,
    }

    impl FixedStore {
        fn new(map_enabled: bool, offset: i64) -> Self {
            Self {
                map_enabled: Cell::new(map_enabled),
                offset,
                reads: Cell::new(0),
            }
        }
    }

    impl ConfigStore for FixedStore {
        fn get_bool(&self, _key: &str) -> Result<bool, ConfigError> {
            self.reads.set(self.reads.get() + 1);
            Ok(self.map_enabled.get())
        }

        fn get_int(&self, _key: &str) -> Result<i64, ConfigError> {
            Ok(self.offset)
        }
    }

    struct DownStore;

    impl ConfigStore for DownStore {
        fn get_bool(&self, _key: &str) -> Result<bool, ConfigError> {
            Err(ConfigError::Busy)
        }

        fn get_int(&self, _key: &str) -> Result<i64, ConfigError> {
            Err(ConfigError::Busy)
        }
    }

    #[test]
    fn config_refresh_runs_after_period() {
        let store = FixedStore::new(true, 10);
        let mut cache = ConfigCache::load(&store, 100);
        assert_eq!(cache.offset_pct, 10);
        assert!(!cache.map_enabled);

        for _ in 0..100 {
            assert!(!cache.tick(&store));
        }
        assert!(cache.tick(&store));
        assert!(cache.map_enabled);
        assert_eq!(store.reads.get(), 1);
    }

    #[test]
    fn unavailable_store_keeps_cached_values() {
        let mut cache = ConfigCache::load(&DownStore, 1);
        assert_eq!(cache.offset_pct, 0);
        cache.map_enabled = true;
        cache.offset_pct = 5;

        cache.tick(&DownStore);
        cache.tick(&DownStore);
        assert!(cache.map_enabled);
        assert_eq!(cache.offset_pct, 5);
    }

    #[test]
    fn resolve_lead_prefers_plan_then_radar() {
        let vehicle = VehicleState {
            lead_distance: 30.0,
            lead_objspd: -4.0,
            ..Default::default()
        };
        let plan = PlanSnapshot {
            d_rel: 40.5,
            v_rel: 1.0,
            ..Default::default()
        };
        assert_eq!(resolve_lead(&vehicle, &plan), (40, 4));
        assert_eq!(resolve_lead(&vehicle, &PlanSnapshot::default()), (30, -4));
        assert_eq!(
            resolve_lead(&VehicleState::default(), &PlanSnapshot::default()),
            (150, 0)
        );
    }

    #[test]
    fn camera_target_applies_offset() {
        let mut engine = SpeedArbitrationEngine::new(EngineConfig::default(), FixedStore::new(false, 10));
        engine.set_cruise_set_speed(100.0);
        let vehicle = VehicleState {
            clu_vanz: 80.0,
            v_set_dis: 80.0,
            mode: CruiseMode::DistCurv,
            safety_sign: 60.0,
            on_speed_control: true,
            lead_distance: 150.0,
            ..Default::default()
        };

        engine.update_lead(&vehicle, &PlanSnapshot::default());
        assert!(engine.state().map_enable);
        assert_eq!(engine.state().target_speed, 66.0);
        assert_eq!(engine.state().last_decision, DecisionTag::Lead(LeadScenario::MapLimit));
    }

    #[test]
    fn nan_cluster_speed_fails_closed() {
        let mut engine = SpeedArbitrationEngine::new(EngineConfig::default(), FixedStore::new(false, 0));
        engine.set_cruise_set_speed(70.0);
        let vehicle = VehicleState {
            clu_vanz: f64::NAN,
            v_set_dis: 60.0,
            mode: CruiseMode::DistCurv,
            ..Default::default()
        };

        assert_eq!(engine.update_lead(&vehicle, &PlanSnapshot::default()), Ramp { wait: 0, speed: 70.0 });
        assert_eq!(engine.update_curve(&vehicle, 20.0), Ramp { wait: 0, speed: 70.0 });
        assert_eq!(engine.state().last_decision, DecisionTag::Rejected);
    }

    #[test]
    fn diagnostic_line_names_mode_and_step() {
        let mut engine = SpeedArbitrationEngine::new(EngineConfig::default(), FixedStore::new(false, 0));
        engine.set_cruise_set_speed(100.0);
        let vehicle = VehicleState {
            clu_vanz: 90.0,
            v_set_dis: 95.0,
            mode: CruiseMode::DistCurv,
            lead_distance: 50.0,
            lead_objspd: -5.0,
            car: crate::state::CarParams {
                mdps_bus: 1,
                scc_bus: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        engine.update_lead(&vehicle, &PlanSnapshot::default());

        let line = engine.diagnostic(&vehicle);
        assert!(line.starts_with("MODE=1  BS=1/2  VL=100/095  TM=060/000"), "{}", line);
        assert!(line.contains("RD=D:050/V:-05"), "{}", line);
        assert!(line.ends_with("DG=7"), "{}", line);
    }
}
