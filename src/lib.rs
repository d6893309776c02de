// ================================
// src/lib.rs
// ================================
pub mod config;
pub mod control; // ramp scheduling shared by every rule
pub mod curve;
pub mod engine;
pub mod error;
pub mod lead;
pub mod pacer;
pub mod state;
pub mod vehicle_setup;

pub use config::EngineConfig;
pub use control::{Ramp, RampScheduler};
pub use engine::{EngineState, SpeedArbitrationEngine};
pub use error::ConfigError;
pub use state::{CarParams, CruiseMode, LaneChangeState, PlanSnapshot, VehicleState};
pub use vehicle_setup::param_config::{ConfigStore, ParamStore};
