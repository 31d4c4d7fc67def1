#[cfg(test)]
mod integration_tests {
    use crate::config::{load_and_validate_config, load_config, ConfigFormat};
    use crate::engine::{Group, LoopMode, LoopSettings, LoopedTrigger};
    use crate::errors::ConfigError;
    use std::io::Write;
    use std::time::Duration;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    /// Test that the shipped YAML configuration loads and validates
    #[test]
    fn test_shipped_yaml_config() {
        let config = load_and_validate_config("configs/engine.yaml").unwrap();

        assert_eq!(config.looped_trigger.mode, LoopMode::FixedAdaptive);
        assert_eq!(config.looped_trigger.step_size_ms, 10);
        assert_eq!(config.steps.fault_history, 32);
    }

    /// Test that the shipped TOML configuration matches the YAML one
    #[test]
    fn test_shipped_toml_config() {
        let yaml = load_and_validate_config("configs/engine.yaml").unwrap();
        let toml = load_and_validate_config("configs/engine.toml").unwrap();
        assert_eq!(yaml, toml);
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let file = write_temp(
            ".yaml",
            "looped_trigger:\n  max_catch_up_steps: 0\n",
        );

        let result = load_and_validate_config(file.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        assert!(load_config(file.path()).is_ok());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_config("configs/does-not-exist.yaml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_config_drives_engine_construction() {
        let file = write_temp(
            ".toml",
            "[looped_trigger]\nmode = \"real_time\"\nstep_size_ms = 4\n\n[events]\ncapacity = 8\n",
        );
        assert_eq!(ConfigFormat::from_path(file.path()).unwrap(), ConfigFormat::Toml);
        let config = load_and_validate_config(file.path()).unwrap();

        let looped = LoopedTrigger::from_config("clock", &config.looped_trigger);
        assert_eq!(
            looped.settings(),
            LoopSettings {
                mode: LoopMode::RealTime,
                step_size: Duration::from_millis(4),
                max_catch_up_steps: 10,
                stop_timeout: Duration::from_millis(1000),
            }
        );

        let group = Group::from_config("root", &config);
        group.add("clock", looped).unwrap();
        assert_eq!(group.all_looped_triggers().len(), 1);
    }
}
