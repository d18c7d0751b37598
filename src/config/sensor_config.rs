use serde::Deserialize;
use std::collections::HashSet;
use std::fs;

use crate::errors::{ConfigError, ConfigResult};
use crate::timing::{TimingStrategy, DEFAULT_COUNTER_HZ};

/// Lowest and highest non-reserved 7-bit I2C addresses
const ADDRESS_RANGE: std::ops::RangeInclusive<u8> = 0x08..=0x77;

fn default_frequency() -> u32 {
    10
}

fn default_counter_hz() -> u32 {
    DEFAULT_COUNTER_HZ
}

/// Root configuration struct expecting `[[sensor]]` TOML array format
#[derive(Debug, Deserialize)]
pub struct SensorConfig {
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(rename = "sensor")]
    pub sensors: Vec<SensorEntry>,
}

/// Optional `[timing]` table selecting the delay strategy
#[derive(Debug, Deserialize)]
pub struct TimingConfig {
    #[serde(default)]
    pub strategy: TimingStrategy,
    #[serde(default = "default_counter_hz")]
    pub counter_hz: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            strategy: TimingStrategy::Auto,
            counter_hz: DEFAULT_COUNTER_HZ,
        }
    }
}

/// One sensor entry, matching each `[[sensor]]` section
#[derive(Debug, Deserialize)]
pub struct SensorEntry {
    pub id: String,
    pub bus: String,
    /// 7-bit I2C address
    pub address: u8,
    /// Poll rate in Hz
    #[serde(default = "default_frequency")]
    pub frequency: u32,
    /// Expected value of the chip id register, checked after binding
    pub chip_id: Option<u8>,
}

impl SensorConfig {
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let parsed: SensorConfig = toml::from_str(content)?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for s in self.sensors.iter() {
            if !seen.insert(s.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("sensor.{}.id", s.id),
                    reason: "duplicate sensor id".to_string(),
                });
            }
            if !ADDRESS_RANGE.contains(&s.address) {
                return Err(ConfigError::InvalidValue {
                    field: format!("sensor.{}.address", s.id),
                    reason: format!("{:#04x} is outside 0x08..=0x77", s.address),
                });
            }
            if s.frequency == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("sensor.{}.frequency", s.id),
                    reason: "must be at least 1 Hz".to_string(),
                });
            }
        }
        if self.timing.counter_hz == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timing.counter_hz".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads config from TOML file
pub fn load_sensor_config(path: &str) -> ConfigResult<SensorConfig> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::LoadError {
        path: path.to_string(),
        source: e,
    })?;
    SensorConfig::from_toml(&content)
}
