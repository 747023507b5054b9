use std::env;
use std::fmt;

use crate::error::ConfigError;
use crate::model::GenerationParams;

const DEFAULT_MODEL: &str = "openai/gpt-5-mini";
const DEFAULT_MODEL_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Keep responses concise.";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 60;
const MAX_TEMPERATURE: f32 = 2.0;

const API_KEY_VARS: [&str; 2] = ["OPENROUTER_API_KEY", "OPENAI_API_KEY"];

#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub model_base_url: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub model_timeout_secs: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("model_base_url", &self.model_base_url)
            .field("system_prompt", &self.system_prompt)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("model_timeout_secs", &self.model_timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| env::var(key).ok())
    }

    fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = API_KEY_VARS
            .iter()
            .filter_map(|key| get_var(*key))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let model_base_url = parse_base_url(get_var("MODEL_BASE_URL").as_deref())?;
        let model = get_var("MODEL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(Self {
            api_key,
            model,
            model_base_url,
            system_prompt: get_var("SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: parse_temperature(get_var("MODEL_TEMPERATURE").as_deref()),
            max_tokens: parse_max_tokens(get_var("MODEL_MAX_TOKENS").as_deref()),
            model_timeout_secs: parse_positive_u64(
                get_var("MODEL_TIMEOUT_SECS").as_deref(),
                DEFAULT_MODEL_TIMEOUT_SECS,
            ),
        })
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

fn parse_base_url(raw: Option<&str>) -> Result<String, ConfigError> {
    let value = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_MODEL_BASE_URL);

    let lower = value.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return Err(ConfigError::InvalidBaseUrl(value.to_string()));
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn parse_positive_u64(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_temperature(raw: Option<&str>) -> f32 {
    raw.and_then(|value| value.trim().parse::<f32>().ok())
        .filter(|value| (0.0..=MAX_TEMPERATURE).contains(value))
        .unwrap_or(DEFAULT_TEMPERATURE)
}

fn parse_max_tokens(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value > 0)
}
