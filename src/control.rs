//! Control channel: prompt, model, stride and timeout updates.
//!
//! Each command is validated in full before anything is mutated, so a
//! rejected command leaves the previous configuration in place.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::error::{ConfigError, ControlError};
use crate::pipeline::{FrameSampler, InferenceScheduler};
use crate::prompt::PromptStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlCommand {
    UpdatePrompt {
        text: String,
        max_tokens: i64,
    },
    UpdateSampleRate {
        #[serde(alias = "everyN")]
        every_n: i64,
    },
    UpdateModel {
        model: String,
    },
    UpdateTimeout {
        timeout_ms: u64,
    },
}

pub struct Controller {
    prompts: Arc<PromptStore>,
    sampler: Arc<FrameSampler>,
    scheduler: InferenceScheduler,
}

impl Controller {
    pub fn new(
        prompts: Arc<PromptStore>,
        sampler: Arc<FrameSampler>,
        scheduler: InferenceScheduler,
    ) -> Self {
        Self {
            prompts,
            sampler,
            scheduler,
        }
    }

    #[instrument(skip(self))]
    pub fn apply(&self, command: ControlCommand) -> Result<(), ControlError> {
        let applied = match command {
            ControlCommand::UpdatePrompt { text, max_tokens } => {
                self.prompts.update(text, max_tokens)
            }
            ControlCommand::UpdateSampleRate { every_n } => {
                if every_n <= 0 {
                    Err(ConfigError::InvalidSampleRate(every_n))
                } else {
                    self.sampler.set_every_n(every_n);
                    Ok(())
                }
            }
            ControlCommand::UpdateModel { model } => self.prompts.update_model(model),
            ControlCommand::UpdateTimeout { timeout_ms } => {
                if timeout_ms == 0 {
                    Err(ConfigError::Invalid {
                        field: "timeout_ms",
                        reason: "must be positive".into(),
                    })
                } else {
                    self.scheduler.set_timeout(Duration::from_millis(timeout_ms));
                    Ok(())
                }
            }
        };

        applied.map_err(|e| {
            warn!("Rejected control command: {}", e);
            ControlError::from(e)
        })
    }

    /// Decode one JSON control message and apply it
    pub fn apply_json(&self, raw: &str) -> Result<ControlCommand, ControlError> {
        let command: ControlCommand = serde_json::from_str(raw)?;
        self.apply(command.clone())?;
        Ok(command)
    }
}
