use crate::models::{GenerationParameters, GenerationSettings, SafetySetting};
use crate::services::backends::gemini::GEMINI_API_BASE;
use crate::services::backends::BackendKind;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_SAFETY_SETTINGS: &str = "HARM_CATEGORY_HARASSMENT=BLOCK_MEDIUM_AND_ABOVE";
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 64;
const DEFAULT_STATIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/static");

/// Process-wide relay configuration. Loaded once, then shared read-only.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub common: core_config::Config,
    pub backend: BackendConfig,
    pub generation: GenerationConfig,
    pub limits: LimitsConfig,
    pub assets: AssetsConfig,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub api_key: Secret<String>,
    pub model_name: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Used by `/chat`.
    pub chat: GenerationSettings,
    /// Used by `/generate-content`.
    pub direct: GenerationSettings,
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub backend_timeout: Duration,
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone)]
pub struct AssetsConfig {
    pub static_dir: PathBuf,
}

impl RelayConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Build the relay settings from any key lookup (the process environment in production).
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let kind: BackendKind = get_parsed(&lookup, "RELAY_BACKEND", BackendKind::Gemini)?;

        // Never fall back to a built-in key.
        let api_key = lookup("GEMINI_API_KEY")
            .map(|key| key.trim().to_string())
            .unwrap_or_default();
        if api_key.is_empty() && kind == BackendKind::Gemini {
            return Err(config_error("GEMINI_API_KEY is required but not set"));
        }

        let chat_parameters = GenerationParameters {
            temperature: get_parsed(
                &lookup,
                "GEMINI_TEMPERATURE",
                GenerationParameters::CHAT.temperature,
            )?,
            top_p: get_parsed(&lookup, "GEMINI_TOP_P", GenerationParameters::CHAT.top_p)?,
            top_k: get_parsed(&lookup, "GEMINI_TOP_K", GenerationParameters::CHAT.top_k)?,
            max_output_tokens: get_parsed(
                &lookup,
                "GEMINI_MAX_OUTPUT_TOKENS",
                GenerationParameters::CHAT.max_output_tokens,
            )?,
        };
        if chat_parameters.max_output_tokens <= 0 {
            return Err(config_error("GEMINI_MAX_OUTPUT_TOKENS must be positive"));
        }

        let safety_settings = SafetySetting::parse_list(&get_env(
            &lookup,
            "RELAY_SAFETY_SETTINGS",
            DEFAULT_SAFETY_SETTINGS,
        ))
        .map_err(|e| config_error(format!("RELAY_SAFETY_SETTINGS: {}", e)))?;

        let timeout_secs: u64 = get_parsed(
            &lookup,
            "RELAY_BACKEND_TIMEOUT_SECS",
            DEFAULT_BACKEND_TIMEOUT_SECS,
        )?;
        let max_concurrent_requests: usize = get_parsed(
            &lookup,
            "RELAY_MAX_CONCURRENT_REQUESTS",
            DEFAULT_MAX_CONCURRENT_REQUESTS,
        )?;
        if timeout_secs == 0 {
            return Err(config_error("RELAY_BACKEND_TIMEOUT_SECS must be positive"));
        }
        if max_concurrent_requests == 0 {
            return Err(config_error("RELAY_MAX_CONCURRENT_REQUESTS must be positive"));
        }

        Ok(RelayConfig {
            common,
            backend: BackendConfig {
                kind,
                api_key: Secret::new(api_key),
                model_name: get_env(&lookup, "GEMINI_MODEL", DEFAULT_MODEL),
                base_url: get_env(&lookup, "GEMINI_API_BASE", GEMINI_API_BASE),
            },
            generation: GenerationConfig {
                chat: GenerationSettings::new(chat_parameters, safety_settings),
                direct: GenerationSettings::new(GenerationParameters::DIRECT, Vec::new()),
            },
            limits: LimitsConfig {
                backend_timeout: Duration::from_secs(timeout_secs),
                max_concurrent_requests,
            },
            assets: AssetsConfig {
                static_dir: PathBuf::from(get_env(&lookup, "RELAY_STATIC_DIR", DEFAULT_STATIC_DIR)),
            },
        })
    }
}

fn config_error(message: impl std::fmt::Display) -> AppError {
    AppError::ConfigError(anyhow::anyhow!("{}", message))
}

fn get_env<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|val| !val.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn get_parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).filter(|val| !val.trim().is_empty()) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|e| config_error(format!("{} has invalid value '{}': {}", key, val, e))),
        None => Ok(default),
    }
}
