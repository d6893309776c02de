// param_config.rs

use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, TryLockError},
    thread,
    time::Duration,
};
use tracing::{info, warn};

use crate::error::ConfigError;

pub const MAP_ENABLE_KEY: &str = "MapSpeedLimitEnable";
pub const SPEED_LIMIT_OFFSET_KEY: &str = "SpeedLimitOffset";

const DEFAULT_CONFIG_PATH: &str = "./speed_param.toml";

/// Read-only view of the process-wide parameter store.
///
/// Implementations must not block: the engine reads from the control loop.
pub trait ConfigStore {
    fn get_bool(&self, key: &str) -> Result<bool, ConfigError>;
    fn get_int(&self, key: &str) -> Result<i64, ConfigError>;
}

impl<T: ConfigStore + ?Sized> ConfigStore for Arc<T> {
    fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        (**self).get_bool(key)
    }

    fn get_int(&self, key: &str) -> Result<i64, ConfigError> {
        (**self).get_int(key)
    }
}

/// Speed limit parameters loaded from TOML file
#[derive(Deserialize, Debug, Clone, Default)]
pub struct SpeedParams {
    /// Take the speed limit from the map planner instead of the sign camera
    #[serde(default)]
    pub map_speed_limit_enable: bool,
    /// Percentage added on top of the detected limit
    #[serde(default)]
    pub speed_limit_offset: i64,
}

impl SpeedParams {
    /// Load parameters from TOML configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path)?;
        Ok(toml::from_str(&config_str)?)
    }
}

/// File-backed parameter store with hot-reload capability
pub struct ParamStore {
    params: Arc<Mutex<SpeedParams>>,
    config_path: PathBuf,
}

impl ParamStore {
    /// Open the file named by `CONFIG_PATH`, or `./speed_param.toml`
    pub fn new() -> Result<Self, ConfigError> {
        let config_path =
            env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::open(config_path)
    }

    pub fn open(config_path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let config_path = config_path.into();
        let params = Arc::new(Mutex::new(SpeedParams::load(&config_path)?));

        info!("Parameter store initialized with config: {}", config_path.display());

        Ok(Self {
            params,
            config_path,
        })
    }

    /// Start background file watcher thread for hot-reload functionality
    pub fn start_file_watcher(&self) {
        let params = self.params.clone();
        let config_path = self.config_path.clone();
        let mut last_modified = fs::metadata(&config_path)
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);

        thread::spawn(move || loop {
            thread::sleep(Duration::from_millis(500));

            // Missing file mid-write is normal; try again next poll
            let Ok(modified) = fs::metadata(&config_path).and_then(|m| m.modified()) else {
                continue;
            };
            if modified <= last_modified {
                continue;
            }

            match SpeedParams::load(&config_path) {
                Ok(new_params) => {
                    if let Ok(mut guard) = params.lock() {
                        *guard = new_params;
                        last_modified = modified;
                        info!("Parameters hot-reloaded!");
                    }
                }
                Err(e) => warn!("Hot-reload failed: {}", e),
            }
        });
    }

    fn snapshot(&self) -> Result<SpeedParams, ConfigError> {
        match self.params.try_lock() {
            Ok(guard) => Ok(guard.clone()),
            Err(TryLockError::WouldBlock) | Err(TryLockError::Poisoned(_)) => Err(ConfigError::Busy),
        }
    }
}

impl ConfigStore for ParamStore {
    fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        match key {
            MAP_ENABLE_KEY => Ok(self.snapshot()?.map_speed_limit_enable),
            _ => Err(ConfigError::MissingKey(key.to_string())),
        }
    }

    fn get_int(&self, key: &str) -> Result<i64, ConfigError> {
        match key {
            SPEED_LIMIT_OFFSET_KEY => Ok(self.snapshot()?.speed_limit_offset),
            _ => Err(ConfigError::MissingKey(key.to_string())),
        }
    }
}
