//! Runtime settings, read from the environment (and a `.env` file if present).
//!
//! | Variable                      | Default                   |
//! |-------------------------------|---------------------------|
//! | `LOCAL_CHAT_DEFAULT_MODEL`    | `smollm-135m-4bit`        |
//! | `LOCAL_CHAT_TEMPERATURE`      | `0.6`                     |
//! | `LOCAL_CHAT_MAX_TOKENS`       | `420`                     |
//! | `LOCAL_CHAT_PUBLISH_EVERY`    | `4`                       |
//! | `LOCAL_CHAT_CACHE_LIMIT_MB`   | `20`                      |
//! | `LOCAL_CHAT_SEED`             | unset (wall clock)        |
//! | `LOCAL_CHAT_MODELS_DIR`       | platform data dir         |

use crate::llm::lifecycle::DEFAULT_CACHE_LIMIT_BYTES;
use crate::llm::model_manager;
use crate::llm::model_registry::{default_model, ModelId};
use crate::llm::session::{GenerateParameters, SeedSource};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{key} must be {requirement}, got {value}")]
    OutOfRange {
        key: &'static str,
        value: String,
        requirement: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub default_model: ModelId,
    pub generation: GenerateParameters,
    pub cache_limit_bytes: u64,
    pub seed: SeedSource,
    pub models_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_model: default_model().id,
            generation: GenerateParameters::default(),
            cache_limit_bytes: DEFAULT_CACHE_LIMIT_BYTES,
            seed: SeedSource::WallClock,
            models_dir: model_manager::default_models_dir(),
        }
    }
}

impl Settings {
    /// Load `.env` (if any), then read settings from process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            log::info!("[CONFIG] Loaded {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("LOCAL_CHAT_DEFAULT_MODEL") {
            settings.default_model = parse("LOCAL_CHAT_DEFAULT_MODEL", &v)?;
        }
        if let Some(v) = get("LOCAL_CHAT_TEMPERATURE") {
            let temperature: f32 = parse("LOCAL_CHAT_TEMPERATURE", &v)?;
            if !temperature.is_finite() || temperature < 0.0 {
                return Err(out_of_range("LOCAL_CHAT_TEMPERATURE", v, "a finite value >= 0"));
            }
            settings.generation.temperature = temperature;
        }
        if let Some(v) = get("LOCAL_CHAT_MAX_TOKENS") {
            settings.generation.max_tokens = parse_positive("LOCAL_CHAT_MAX_TOKENS", v)?;
        }
        if let Some(v) = get("LOCAL_CHAT_PUBLISH_EVERY") {
            settings.generation.publish_every = parse_positive("LOCAL_CHAT_PUBLISH_EVERY", v)?;
        }
        if let Some(v) = get("LOCAL_CHAT_CACHE_LIMIT_MB") {
            let mb: u64 = parse("LOCAL_CHAT_CACHE_LIMIT_MB", &v)?;
            settings.cache_limit_bytes = mb.checked_mul(1024 * 1024).ok_or_else(|| {
                out_of_range("LOCAL_CHAT_CACHE_LIMIT_MB", v.clone(), "small enough to fit u64 bytes")
            })?;
        }
        if let Some(v) = get("LOCAL_CHAT_SEED") {
            settings.seed = SeedSource::Fixed(parse("LOCAL_CHAT_SEED", &v)?);
        }
        if let Some(v) = get("LOCAL_CHAT_MODELS_DIR") {
            settings.models_dir = PathBuf::from(v);
        }

        log::debug!("[CONFIG] {:?}", settings);
        Ok(settings)
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_positive(key: &'static str, value: String) -> Result<usize, ConfigError> {
    let n: usize = parse(key, &value)?;
    if n == 0 {
        return Err(out_of_range(key, value, "at least 1"));
    }
    Ok(n)
}

fn out_of_range(key: &'static str, value: String, requirement: &'static str) -> ConfigError {
    ConfigError::OutOfRange {
        key,
        value,
        requirement,
    }
}
