// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::config::consts::{
    DEFAULT_EVENT_CAPACITY, DEFAULT_FAULT_HISTORY, DEFAULT_LOG_FILTER, DEFAULT_MAX_CATCH_UP_STEPS,
    DEFAULT_STEP_SIZE_MS, DEFAULT_STOP_TIMEOUT_MS,
};
use crate::engine::LoopMode;
use crate::errors::ConfigError;

/// Engine configuration.
///
/// Every section and field is optional; missing values take the defaults in
/// [`consts`](crate::config::consts). The configuration is loaded explicitly and
/// handed to the constructors that need it (`LoopedTrigger::from_config`,
/// `Group::from_config`, `StepNode::with_fault_history`).
///
/// # Example
/// ```yaml
/// looped_trigger:
///   mode: fixed_adaptive
///   step_size_ms: 10
///   max_catch_up_steps: 10
///   stop_timeout_ms: 1000
/// steps:
///   fault_history: 32
/// events:
///   capacity: 256
/// logging:
///   filter: "trigger_graph=debug"
/// ```
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub looped_trigger: LoopedTriggerConfig,
    #[serde(default)]
    pub steps: StepsConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Defaults for looped triggers.
///
/// # Fields
/// * `mode` - how wall-clock time is turned into pulses
/// * `step_size_ms` - pulse step size; the loop sleeps this long between iterations
/// * `max_catch_up_steps` - bound on catch-up pulses per iteration in `fixed_adaptive` mode
/// * `stop_timeout_ms` - how long a stop waits for the loop thread
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoopedTriggerConfig {
    pub mode: LoopMode,
    pub step_size_ms: u64,
    pub max_catch_up_steps: u32,
    pub stop_timeout_ms: u64,
}

impl Default for LoopedTriggerConfig {
    fn default() -> Self {
        Self {
            mode: LoopMode::default(),
            step_size_ms: DEFAULT_STEP_SIZE_MS,
            max_catch_up_steps: DEFAULT_MAX_CATCH_UP_STEPS,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct StepsConfig {
    /// Faults remembered per step; older ones are dropped.
    pub fault_history: usize,
}

impl Default for StepsConfig {
    fn default() -> Self {
        Self {
            fault_history: DEFAULT_FAULT_HISTORY,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    /// Events a slow subscriber may lag behind before it starts missing some.
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive. `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Picks the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

pub fn parse_config(content: &str, format: ConfigFormat) -> Result<EngineConfig, ConfigError> {
    let config = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
        ConfigFormat::Toml => toml::from_str(content)?,
    };
    Ok(config)
}

/// Load a config from a YAML or TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let content = fs::read_to_string(path)?;
    parse_config(&content, format)
}

/// Rejects values the engine cannot run with. All problems are reported at once.
pub fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    let mut problems = Vec::new();
    if config.looped_trigger.step_size_ms == 0 {
        problems.push("looped_trigger.step_size_ms must be greater than zero");
    }
    if config.looped_trigger.max_catch_up_steps == 0 {
        problems.push("looped_trigger.max_catch_up_steps must be greater than zero");
    }
    if config.steps.fault_history == 0 {
        problems.push("steps.fault_history must be greater than zero");
    }
    if config.events.capacity == 0 {
        problems.push("events.capacity must be greater than zero");
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(problems.join("; ")))
    }
}

/// Load and validate a config from a YAML or TOML file
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let config = load_config(path)?;
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_config() {
        let yaml = r#"
looped_trigger:
  mode: real_time
  step_size_ms: 5
events:
  capacity: 16
"#;

        let cfg = parse_config(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(cfg.looped_trigger.mode, LoopMode::RealTime);
        assert_eq!(cfg.looped_trigger.step_size_ms, 5);
        assert_eq!(cfg.looped_trigger.max_catch_up_steps, DEFAULT_MAX_CATCH_UP_STEPS);
        assert_eq!(cfg.events.capacity, 16);
        assert_eq!(cfg.steps.fault_history, DEFAULT_FAULT_HISTORY);
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let cfg = parse_config("{}", ConfigFormat::Yaml).unwrap();
        assert_eq!(cfg, EngineConfig::default());

        let cfg = parse_config("", ConfigFormat::Toml).unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn parse_toml_config() {
        let toml = r#"
[looped_trigger]
mode = "fixed"
stop_timeout_ms = 250

[logging]
filter = "trigger_graph=debug"
"#;

        let cfg = parse_config(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(cfg.looped_trigger.mode, LoopMode::Fixed);
        assert_eq!(cfg.looped_trigger.stop_timeout_ms, 250);
        assert_eq!(cfg.logging.filter, "trigger_graph=debug");
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let result = parse_config("looped_trigger:\n  mode: sometimes\n", ConfigFormat::Yaml);
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.yml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.YAML")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")).unwrap(), ConfigFormat::Toml);
        assert!(matches!(
            ConfigFormat::from_path(Path::new("a.json")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn validation_reports_every_problem() {
        let mut cfg = EngineConfig::default();
        cfg.looped_trigger.step_size_ms = 0;
        cfg.events.capacity = 0;

        let err = validate_config(&cfg).unwrap_err().to_string();
        assert!(err.contains("step_size_ms"));
        assert!(err.contains("events.capacity"));
        assert!(!err.contains("fault_history"));
    }
}
