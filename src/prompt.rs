//! Shared prompt/parameter holder read by the scheduler before every call.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

/// Snapshot of the parameters sent with each inference request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptConfig {
    pub prompt: String,
    pub max_tokens: u32,
    pub model: String,
}

impl PromptConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prompt.trim().is_empty() {
            return Err(ConfigError::EmptyPrompt);
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::InvalidMaxTokens(0));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        Ok(())
    }
}

/// Copy-on-write holder for the current [`PromptConfig`].
///
/// Readers get an `Arc` snapshot without locking; every update swaps in a
/// whole new value, so a reader never sees a prompt paired with another
/// update's token budget.
pub struct PromptStore {
    current: ArcSwap<PromptConfig>,
}

impl PromptStore {
    pub fn new(initial: PromptConfig) -> Result<Self, ConfigError> {
        initial.validate()?;
        Ok(Self {
            current: ArcSwap::from_pointee(initial),
        })
    }

    pub fn current(&self) -> Arc<PromptConfig> {
        self.current.load_full()
    }

    /// Replace prompt text and token budget together
    pub fn update(&self, prompt: impl Into<String>, max_tokens: i64) -> Result<(), ConfigError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(ConfigError::EmptyPrompt);
        }
        let max_tokens = u32::try_from(max_tokens)
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::InvalidMaxTokens(max_tokens))?;

        self.current.rcu(|cur| PromptConfig {
            prompt: prompt.clone(),
            max_tokens,
            model: cur.model.clone(),
        });
        info!("Prompt updated (max_tokens={max_tokens}): {prompt:?}");
        Ok(())
    }

    pub fn update_model(&self, model: impl Into<String>) -> Result<(), ConfigError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }

        self.current.rcu(|cur| PromptConfig {
            model: model.clone(),
            ..PromptConfig::clone(cur)
        });
        info!("Model switched to {model}");
        Ok(())
    }
}
