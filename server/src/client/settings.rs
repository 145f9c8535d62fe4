use std::{env, time::Duration};

use color_eyre::eyre::eyre;

use crate::state::env_or;

pub const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Sampling parameters sent with every `generateContent` call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            max_output_tokens: 1000,
        }
    }
}

#[derive(Clone)]
pub struct ChatSettings {
    pub gemini_api_key: String,
    pub gemini_api_url: String,
    pub model: String,
    pub generation: GenerationSettings,
    pub auth_poll_interval: Duration,
    pub auth_wait_timeout: Duration,
}

impl ChatSettings {
    pub fn from_env() -> color_eyre::Result<Self> {
        let gemini_api_key = env::var("GEMINI_API_KEY")
            .map_err(|_| eyre!("GEMINI_API_KEY environment variable not set"))?;
        let defaults = GenerationSettings::default();

        Ok(Self {
            gemini_api_key,
            gemini_api_url: env::var("GEMINI_API_URL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_API_URL.to_string()),
            model: env::var("DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            generation: GenerationSettings {
                temperature: env_or("DEFAULT_TEMPERATURE", defaults.temperature)?,
                top_p: env_or("DEFAULT_TOP_P", defaults.top_p)?,
                max_output_tokens: env_or("DEFAULT_MAX_OUTPUT_TOKENS", defaults.max_output_tokens)?,
            },
            auth_poll_interval: Duration::from_secs(env_or("AUTH_POLL_INTERVAL_SECS", 5u64)?),
            auth_wait_timeout: Duration::from_secs(env_or("AUTH_WAIT_TIMEOUT_SECS", 300u64)?),
        })
    }
}

impl std::fmt::Debug for ChatSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSettings")
            .field("gemini_api_key", &"[redacted]")
            .field("gemini_api_url", &self.gemini_api_url)
            .field("model", &self.model)
            .field("generation", &self.generation)
            .field("auth_poll_interval", &self.auth_poll_interval)
            .field("auth_wait_timeout", &self.auth_wait_timeout)
            .finish()
    }
}
