// ================================
// src/state.rs - per-cycle input snapshots
// ================================
use serde::Deserialize;

/// Lead distance reported when nothing is tracked ahead (m).
pub const FAR_DISTANCE: f64 = 150.0;

/// Upper bound for any absolute speed taken from the bus (km/h).
pub const MAX_SPEED_KPH: f64 = 300.0;

/// Relative speeds beyond this are treated as sensor garbage (km/h).
const MAX_REL_SPEED_KPH: f64 = 250.0;

/// Cruise mode selector as exposed on the cluster.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CruiseMode {
    #[default]
    Stock,
    DistCurv,
    Dist,
    Curv,
    OneWay,
    MapDecelOnly,
}

impl CruiseMode {
    /// Numeric selector value shown in diagnostics.
    pub fn code(self) -> u8 {
        match self {
            CruiseMode::Stock => 0,
            CruiseMode::DistCurv => 1,
            CruiseMode::Dist => 2,
            CruiseMode::Curv => 3,
            CruiseMode::OneWay => 4,
            CruiseMode::MapDecelOnly => 5,
        }
    }

    /// Modes in which the lead cascade may act on the gap.
    pub fn follows_lead(self) -> bool {
        matches!(self, CruiseMode::DistCurv | CruiseMode::Dist | CruiseMode::OneWay)
    }

    /// Modes in which the curvature cascade may lower the target.
    pub fn follows_curve(self) -> bool {
        matches!(self, CruiseMode::DistCurv | CruiseMode::Curv | CruiseMode::OneWay)
    }

    pub fn is_map_decel_only(self) -> bool {
        self == CruiseMode::MapDecelOnly
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LaneChangeState {
    #[default]
    Off,
    PreLaneChange,
    LaneChangeStarting,
    LaneChangeFinishing,
}

/// Static car configuration.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct CarParams {
    /// Navigation resume speed limit, 0 when unset (km/h)
    pub res_speed: f64,
    pub mdps_bus: u8,
    pub scc_bus: u8,
}

/// Vehicle-bus snapshot for one control cycle. Speeds in km/h, distances in m.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct VehicleState {
    pub clu_vanz: f64,
    pub v_set_dis: f64,
    pub mode: CruiseMode,

    // Radar lead
    pub lead_distance: f64,
    pub lead_objspd: f64,

    /// Cycles remaining on the driver accel-pedal override, 0 when released
    pub driver_acc_time: u32,

    pub lane_change: LaneChangeState,
    pub left_blinker: bool,
    pub right_blinker: bool,

    // Vehicle-detected speed limit sign
    pub safety_sign: f64,
    pub on_speed_control: bool,

    pub cruise_gap: u8,
    pub car: CarParams,
}

impl VehicleState {
    /// Both speeds the cascades compare against are usable.
    pub fn speeds_valid(&self) -> bool {
        self.clu_vanz.is_finite() && self.v_set_dis.is_finite()
    }

    pub fn blinker_on(&self) -> bool {
        self.left_blinker || self.right_blinker
    }

    /// Copy with every collaborator-supplied number clamped into range.
    pub fn sanitized(&self) -> Self {
        let mut clean = self.clone();
        clean.clu_vanz = speed_kph(self.clu_vanz);
        clean.v_set_dis = speed_kph(self.v_set_dis);
        clean.lead_distance = distance_or_far(self.lead_distance);
        clean.lead_objspd = clamp_or_zero(self.lead_objspd, MAX_REL_SPEED_KPH);
        clean.safety_sign = speed_kph(self.safety_sign);
        clean.car.res_speed = speed_kph(self.car.res_speed);
        clean
    }
}

/// Longitudinal plan output for one control cycle.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct PlanSnapshot {
    /// Lead distance (m)
    pub d_rel: f64,
    /// Lead lateral offset (m)
    pub y_rel: f64,
    /// Lead relative speed (m/s)
    pub v_rel: f64,
    /// Camera/map speed limit (km/h), 0 when none
    pub target_speed_camera: f64,
    pub on_speed_control: bool,
}

impl PlanSnapshot {
    pub fn sanitized(&self) -> Self {
        Self {
            d_rel: distance_or_far(self.d_rel),
            y_rel: if self.y_rel.is_finite() { self.y_rel } else { 0.0 },
            v_rel: clamp_or_zero(self.v_rel, MAX_REL_SPEED_KPH / 3.6),
            target_speed_camera: speed_kph(self.target_speed_camera),
            on_speed_control: self.on_speed_control,
        }
    }
}

fn speed_kph(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v.min(MAX_SPEED_KPH)
    } else {
        0.0
    }
}

fn distance_or_far(d: f64) -> f64 {
    if d.is_finite() && d >= 0.0 {
        d
    } else {
        FAR_DISTANCE
    }
}

fn clamp_or_zero(v: f64, limit: f64) -> f64 {
    if v.is_finite() {
        v.clamp(-limit, limit)
    } else {
        0.0
    }
}
