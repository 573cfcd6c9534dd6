use std::env;
use std::time::Duration;

use crate::error::ConfigError;

pub const API_KEY_ENV: &str = "MODELSCOPE_API_KEY";
pub const API_KEY_FALLBACK_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://api-inference.modelscope.cn/v1";
pub const DEFAULT_MODEL: &str = "Qwen/Qwen3-235B-A22B-Instruct-2507";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, harmless, and honest assistant. Do not provide harmful, illegal, or inappropriate content.";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const MIN_TEMPERATURE: f32 = 0.1;
pub const MAX_TEMPERATURE: f32 = 2.0;
pub const MIN_OUTPUT_TOKENS: u32 = 100;

/// Runtime limits and endpoint settings, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub max_message_length: usize,
    pub max_history_length: usize,
    pub rate_limit_delay: Duration,
    pub max_file_size: u64,
    pub max_output_tokens: u32,
    pub default_output_tokens: u32,
    pub request_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_message_length: 16_000,
            max_history_length: 50,
            rate_limit_delay: Duration::from_secs(1),
            max_file_size: 10 * 1024 * 1024,
            max_output_tokens: 32_000,
            default_output_tokens: 8_000,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let base_url = get("PARLEY_BASE_URL")
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);
        let max_output_tokens = parse_number(&get, "MAX_OUTPUT_TOKENS", defaults.max_output_tokens)?;
        let default_output_tokens =
            parse_number(&get, "DEFAULT_OUTPUT_TOKENS", defaults.default_output_tokens)?;
        if default_output_tokens > max_output_tokens {
            return Err(ConfigError::OutOfRange {
                key: "DEFAULT_OUTPUT_TOKENS".to_string(),
                reason: format!("{default_output_tokens} exceeds MAX_OUTPUT_TOKENS ({max_output_tokens})"),
            });
        }

        Ok(Self {
            api_key: get(API_KEY_ENV).or_else(|| get(API_KEY_FALLBACK_ENV)),
            base_url,
            model: get("PARLEY_MODEL").unwrap_or(defaults.model),
            system_prompt: get("PARLEY_SYSTEM_PROMPT").unwrap_or(defaults.system_prompt),
            max_message_length: parse_number(
                &get,
                "MAX_MESSAGE_LENGTH",
                defaults.max_message_length,
            )?,
            max_history_length: parse_number(
                &get,
                "MAX_HISTORY_LENGTH",
                defaults.max_history_length,
            )?,
            rate_limit_delay: Duration::from_secs(parse_number(
                &get,
                "RATE_LIMIT_DELAY",
                defaults.rate_limit_delay.as_secs(),
            )?),
            max_file_size: parse_number(&get, "MAX_FILE_SIZE", defaults.max_file_size)?,
            max_output_tokens,
            default_output_tokens,
            request_timeout: Duration::from_secs(parse_number(
                &get,
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
        })
    }

    /// The credential, or the startup error that aborts the process.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential {
                primary: API_KEY_ENV,
                fallback: API_KEY_FALLBACK_ENV,
            })
    }

    pub fn clamp_temperature(value: f32) -> f32 {
        if value.is_nan() {
            return DEFAULT_TEMPERATURE;
        }
        value.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
    }

    pub fn clamp_output_tokens(&self, value: u32) -> u32 {
        value.clamp(MIN_OUTPUT_TOKENS, self.max_output_tokens.max(MIN_OUTPUT_TOKENS))
    }

    /// Human-readable summary of the active model and limits.
    pub fn api_info(&self) -> String {
        [
            "Current API configuration:".to_string(),
            format!("  - model: {}", self.model),
            format!("  - endpoint: {}", self.base_url),
            format!("  - max output tokens: {}", self.max_output_tokens),
            format!("  - default output tokens: {}", self.default_output_tokens),
            format!("  - max message length: {} characters", self.max_message_length),
            format!("  - history limit: {} messages", self.max_history_length),
            format!("  - min delay between requests: {}s", self.rate_limit_delay.as_secs()),
            String::new(),
            "Tokens: one token is roughly 0.75 CJK characters or part of an English word."
                .to_string(),
        ]
        .join("\n")
    }
}

fn parse_number<G, T>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::InvalidNumber {
            key: key.to_string(),
            value: raw,
        }),
    }
}
