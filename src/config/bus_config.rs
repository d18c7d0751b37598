use serde::Deserialize;
use std::fs;

use crate::bus::BusType;
use crate::errors::{ConfigError, ConfigResult};

/// Root structure for loading `[[bus]]` style TOML config
#[derive(Debug, Deserialize)]
pub struct BusConfig {
    #[serde(rename = "bus")]
    pub buses: Vec<BusEntry>,
}

/// One bus entry (e.g., a Linux i2c-dev node or a simulated bus)
#[derive(Debug, Deserialize)]
pub struct BusEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub r#type: String, // 'type' is a reserved word in Rust, use raw identifier
    #[serde(default)]
    pub path: String,
}

impl BusEntry {
    pub fn bus_type(&self) -> ConfigResult<BusType> {
        BusType::from_str(&self.r#type).ok_or_else(|| ConfigError::InvalidValue {
            field: format!("bus.{}.type", self.id),
            reason: format!("unknown bus type '{}'", self.r#type),
        })
    }
}

impl BusConfig {
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let parsed: BusConfig = toml::from_str(content)?;
        for b in parsed.buses.iter() {
            if b.bus_type()? == BusType::I2C && b.path.is_empty() {
                return Err(ConfigError::MissingField {
                    field: format!("bus.{}.path", b.id),
                });
            }
        }
        Ok(parsed)
    }
}

/// Load bus config file
pub fn load_bus_config(path: &str) -> ConfigResult<BusConfig> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::LoadError {
        path: path.to_string(),
        source: e,
    })?;
    BusConfig::from_toml(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_buses() {
        let cfg = BusConfig::from_toml(
            r#"
            [[bus]]
            id = "i2c1"
            type = "i2c"
            path = "/dev/i2c-1"

            [[bus]]
            id = "bench"
            type = "sim"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.buses.len(), 2);
        assert_eq!(cfg.buses[0].bus_type().unwrap(), BusType::I2C);
        assert_eq!(cfg.buses[1].bus_type().unwrap(), BusType::Sim);
    }

    #[test]
    fn test_i2c_bus_requires_path() {
        let err = BusConfig::from_toml("[[bus]]\nid = \"i2c1\"\ntype = \"i2c\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { .. }));
    }

    #[test]
    fn test_unknown_bus_type() {
        let err = BusConfig::from_toml("[[bus]]\nid = \"x\"\ntype = \"can\"\n").unwrap_err();
        assert!(err.to_string().contains("unknown bus type"));
    }
}
