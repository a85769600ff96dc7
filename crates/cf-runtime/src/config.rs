//! Controller configuration files.
//!
//! ```yaml
//! period: 0.01
//! signals: [x, y]
//! filters:
//!   - name: gain
//!     block: { type: Gain, gain: 2 }
//!     inputs: [x]
//!     outputs: [y]
//! ```

use std::path::Path;

use cf_controls::{BlockKind, ControlError};
use cf_core::period_from_secs;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeResult;

fn default_period() -> f64 {
    crate::clock::DEFAULT_PERIOD.as_secs_f64()
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    /// Tick period in seconds.
    #[serde(default = "default_period")]
    pub period: f64,
    #[serde(default)]
    pub signals: Vec<String>,
    #[serde(default)]
    pub sources: Vec<BlockConfig>,
    #[serde(default)]
    pub filters: Vec<BlockConfig>,
    #[serde(default)]
    pub sinks: Vec<BlockConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            period: default_period(),
            signals: Vec::new(),
            sources: Vec::new(),
            filters: Vec::new(),
            sinks: Vec::new(),
        }
    }
}

/// A block placed in one of the controller's sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockConfig {
    pub name: String,
    pub block: BlockKind,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ControllerConfig {
    /// Check the values serde cannot, such as a positive finite period.
    pub fn validate(&self) -> RuntimeResult<()> {
        period_from_secs(self.period).map_err(|e| ControlError::config(e.to_string()))?;
        Ok(())
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(content: &str) -> RuntimeResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(content: &str) -> RuntimeResult<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> RuntimeResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Load a configuration from a YAML file.
pub fn load_yaml(path: &Path) -> RuntimeResult<ControllerConfig> {
    let content = std::fs::read_to_string(path)?;
    ControllerConfig::from_yaml_str(&content)
}

/// Validate `config` and write it to `path` as YAML.
pub fn save_yaml(path: &Path, config: &ControllerConfig) -> RuntimeResult<()> {
    config.validate()?;
    std::fs::write(path, config.to_yaml_string()?)?;
    Ok(())
}

/// Load a configuration from a JSON file.
pub fn load_json(path: &Path) -> RuntimeResult<ControllerConfig> {
    let content = std::fs::read_to_string(path)?;
    ControllerConfig::from_json_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;

    const BALANCE: &str = r#"
period: 0.005
signals: [theta, u]
filters:
  - name: controller
    block:
      type: System
      model: { type: TransferFunction, num: [1, -0.5], den: [1, -0.9] }
    inputs: [theta]
    outputs: [u]
sinks:
  - name: log
    block: { type: Logger, capacity: 1000 }
    inputs: [clock, theta, u]
    enabled: false
"#;

    #[test]
    fn parses_yaml() {
        let config = ControllerConfig::from_yaml_str(BALANCE).unwrap();
        assert_eq!(config.period, 0.005);
        assert_eq!(config.signals, vec!["theta", "u"]);
        assert_eq!(config.filters[0].block.type_name(), "System");
        assert!(config.filters[0].enabled);
        assert!(!config.sinks[0].enabled);
    }

    #[test]
    fn defaults_apply() {
        let config = ControllerConfig::from_yaml_str("signals: [x]").unwrap();
        assert_eq!(config.period, 0.01);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn rejects_bad_documents() {
        assert!(matches!(
            ControllerConfig::from_yaml_str("period: -1"),
            Err(RuntimeError::Control(ControlError::Config { .. }))
        ));
        assert!(matches!(
            ControllerConfig::from_yaml_str("perod: 1"),
            Err(RuntimeError::Yaml(_))
        ));
        assert!(ControllerConfig::from_json_str(r#"{"filters": [{"name": "g"}]}"#).is_err());
    }

    #[test]
    fn yaml_round_trip() {
        let config = ControllerConfig::from_yaml_str(BALANCE).unwrap();
        let text = config.to_yaml_string().unwrap();
        assert_eq!(ControllerConfig::from_yaml_str(&text).unwrap(), config);
    }

    fn scratch(file: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("ctrlflow-{}-{file}", std::process::id()))
    }

    #[test]
    fn files_round_trip() {
        let config = ControllerConfig::from_yaml_str(BALANCE).unwrap();
        let path = scratch("balance.yaml");
        save_yaml(&path, &config).unwrap();
        assert_eq!(load_yaml(&path).unwrap(), config);
        std::fs::remove_file(&path).unwrap();

        let path = scratch("plain.json");
        std::fs::write(&path, r#"{"period": 0.02, "signals": ["a", "b"]}"#).unwrap();
        let loaded = load_json(&path).unwrap();
        assert_eq!(loaded.period, 0.02);
        assert_eq!(loaded.signals, vec!["a", "b"]);
        std::fs::remove_file(&path).unwrap();

        assert!(load_yaml(&scratch("missing.yaml")).is_err());
    }
}
