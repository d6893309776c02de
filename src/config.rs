// ================================
// src/config.rs - engine tunables
// ================================
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EngineConfig {
    // Lead following
    pub follow_ratio: f64,
    pub max_follow_distance: i32,

    // Camera / map limit
    pub camera_floor_kph: i32,
    pub refresh_period: u32,

    // Ramp pacing
    pub ramp_safety_margin: i32,
    pub ramp_slow_wait: u32,
    pub idle_wait: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            follow_ratio: 0.4,
            max_follow_distance: 100,
            camera_floor_kph: 29,
            refresh_period: 100,
            ramp_safety_margin: 5,
            ramp_slow_wait: 100,
            idle_wait: 300,
        }
    }
}
