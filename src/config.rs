//! Layered configuration: built-in defaults, then a TOML file, then
//! `SCENECAST__SECTION__KEY` environment variables.

use std::path::Path;
use std::time::Duration;

use ::config::{Environment, File, FileFormat};
use tracing::info;

use crate::error::ConfigError;
use crate::pipeline::SchedulerOptions;
use crate::prompt::PromptConfig;
use crate::Config;

pub const DEFAULT_CONFIG_FILE: &str = "scenecast.toml";
pub const ENV_PREFIX: &str = "SCENECAST";

const DEVICE_TREE_MODEL: &str = "/proc/device-tree/model";

impl Config {
    /// Load from `path` (required if given, optional default file otherwise)
    /// and the environment, then apply the low-power profile and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let mut config: Config = ::config::Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        config.apply_low_power(is_low_power_host());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let mut config: Config = ::config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.apply_low_power(false);
        config.validate()?;
        Ok(config)
    }

    /// Switch to the low-power stride and token budget when enabled
    /// explicitly, or when unset and `detected` is true.
    pub fn apply_low_power(&mut self, detected: bool) {
        if !self.low_power.enabled.unwrap_or(detected) {
            return;
        }
        info!(
            "Low-power profile: processing every {} frames, max {} tokens",
            self.low_power.process_every, self.low_power.max_tokens
        );
        self.pipeline.process_every = self.low_power.process_every;
        self.prompt.max_tokens = self.low_power.max_tokens;
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.prompt_config().validate()?;
        if self.pipeline.process_every == 0 {
            return Err(ConfigError::InvalidSampleRate(0));
        }
        let positive = [
            ("pipeline.metrics_window", self.pipeline.metrics_window as u64),
            ("pipeline.inference_timeout_ms", self.pipeline.inference_timeout_ms),
            ("broadcast.subscriber_buffer", self.broadcast.subscriber_buffer as u64),
            ("capture.fps", u64::from(self.capture.fps)),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be positive".into(),
                });
            }
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "backend.base_url",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    pub fn prompt_config(&self) -> PromptConfig {
        PromptConfig {
            prompt: self.prompt.text.clone(),
            max_tokens: self.prompt.max_tokens,
            model: self.backend.model.clone(),
        }
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            timeout: Duration::from_millis(self.pipeline.inference_timeout_ms),
            metrics_window: self.pipeline.metrics_window,
        }
    }
}

/// True on a Raspberry Pi, judged by the device-tree model string
pub fn is_low_power_host() -> bool {
    std::fs::read_to_string(DEVICE_TREE_MODEL)
        .map(|model| model.contains("Raspberry Pi"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.pipeline.process_every, 30);
        assert_eq!(config.pipeline.metrics_window, 100);
        assert_eq!(config.prompt.max_tokens, 512);
        assert_eq!(config.backend.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn partial_sections_override_only_named_keys() {
        let config = Config::from_toml_str(
            r#"
            [backend]
            base_url = "http://gpu-box:8000/v1"
            model = "Qwen/Qwen2.5-VL-7B-Instruct"

            [pipeline]
            process_every = 15
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.model, "Qwen/Qwen2.5-VL-7B-Instruct");
        assert_eq!(config.pipeline.process_every, 15);
        assert_eq!(config.pipeline.inference_timeout_ms, 30_000);
        assert_eq!(config.backend.connect_timeout_ms, 5_000);
    }

    #[test]
    fn explicit_low_power_profile_wins() {
        let config = Config::from_toml_str(
            r#"
            [low_power]
            enabled = true
            process_every = 120
            max_tokens = 75
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.process_every, 120);
        assert_eq!(config.prompt.max_tokens, 75);
    }

    #[test]
    fn detection_applies_only_when_unset() {
        let mut auto = Config::default();
        auto.apply_low_power(true);
        assert_eq!(auto.pipeline.process_every, 60);
        assert_eq!(auto.prompt.max_tokens, 100);

        let mut forced_off = Config::default();
        forced_off.low_power.enabled = Some(false);
        forced_off.apply_low_power(true);
        assert_eq!(forced_off.pipeline.process_every, 30);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            Config::from_toml_str("[prompt]\ntext = \"\""),
            Err(ConfigError::EmptyPrompt)
        ));
        assert!(matches!(
            Config::from_toml_str("[pipeline]\nprocess_every = 0"),
            Err(ConfigError::InvalidSampleRate(0))
        ));
        assert!(matches!(
            Config::from_toml_str("[broadcast]\nsubscriber_buffer = 0"),
            Err(ConfigError::Invalid {
                field: "broadcast.subscriber_buffer",
                ..
            })
        ));
    }

    #[test]
    fn environment_overrides_defaults() {
        // The only test in this binary that reads the process environment
        std::env::set_var("SCENECAST__PIPELINE__PROCESS_EVERY", "7");
        std::env::set_var("SCENECAST__BACKEND__MODEL", "llava");
        std::env::set_var("SCENECAST__LOW_POWER__ENABLED", "false");
        let loaded = Config::load(None);
        for key in [
            "SCENECAST__PIPELINE__PROCESS_EVERY",
            "SCENECAST__BACKEND__MODEL",
            "SCENECAST__LOW_POWER__ENABLED",
        ] {
            std::env::remove_var(key);
        }

        let config = loaded.unwrap();
        assert_eq!(config.pipeline.process_every, 7);
        assert_eq!(config.backend.model, "llava");
        assert_eq!(config.prompt.max_tokens, 512);
    }
}
