//! Runtime configuration.
//!
//! Credentials come from the environment (a `.env` file in the working
//! directory is loaded first). Tuning knobs live in an optional TOML file,
//! `floodrisk.toml` by default or the path in `FLOODRISK_CONFIG`; every key
//! has a default, so the file may be absent.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::LogLevel;
use crate::model::PipelineError;
use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "floodrisk.toml";
pub const CONFIG_PATH_ENV: &str = "FLOODRISK_CONFIG";

pub const DEFAULT_WEATHER_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const DEFAULT_MODEL_NAME: &str = "gemini-2.5-flash-lite";

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// PostgreSQL connection settings (`DB_HOST`, `DB_NAME`, `DB_USER`,
/// `DB_PASS`, `DB_PORT`).
#[derive(Debug, Clone, PartialEq)]
pub struct DbConfig {
    pub host: String,
    pub name: String,
    pub user: String,
    pub password: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherConfig {
    pub base_url: String,
    pub cache_dir: PathBuf,
    /// `None` keeps cached responses forever.
    pub cache_ttl: Option<Duration>,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub api_key: String,
    pub name: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub file: Option<String>,
    pub timestamps: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db: DbConfig,
    pub weather: WeatherConfig,
    pub model: ModelConfig,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    weather: WeatherSection,
    model: ModelSection,
    logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct WeatherSection {
    base_url: String,
    cache_dir: String,
    cache_ttl_hours: Option<u64>,
    max_retries: u32,
    backoff_base_ms: u64,
    timeout_secs: u64,
}

impl Default for WeatherSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_WEATHER_URL.to_string(),
            cache_dir: ".cache".to_string(),
            cache_ttl_hours: None,
            max_retries: 5,
            backoff_base_ms: 200,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ModelSection {
    name: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL_NAME.to_string(),
            timeout_secs: 60,
            max_retries: RetryPolicy::model_default().max_retries,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LoggingSection {
    level: String,
    file: Option<String>,
    timestamps: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            timestamps: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Loads `.env`, the optional TOML file, and the process environment.
pub fn load() -> Result<Config, PipelineError> {
    dotenv::dotenv().ok();

    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let contents = read_optional(Path::new(&path))?;

    from_sources(contents.as_deref(), |key| std::env::var(key).ok())
}

fn read_optional(path: &Path) -> Result<Option<String>, PipelineError> {
    if !path.exists() {
        return Ok(None);
    }
    std::fs::read_to_string(path)
        .map(Some)
        .map_err(|e| PipelineError::Config(format!("cannot read {}: {}", path.display(), e)))
}

/// Builds a configuration from TOML text (if any) and an environment lookup.
pub fn from_sources(
    file_contents: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config, PipelineError> {
    let file: FileConfig = match file_contents {
        Some(text) => toml::from_str(text)
            .map_err(|e| PipelineError::Config(format!("invalid config file: {}", e)))?,
        None => FileConfig::default(),
    };

    let required = |key: &str| -> Result<String, PipelineError> {
        env(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| PipelineError::Config(format!("{} must be set", key)))
    };

    let port_text = required("DB_PORT")?;
    let port = port_text
        .trim()
        .parse::<u16>()
        .map_err(|_| PipelineError::Config(format!("DB_PORT is not a valid port: {}", port_text)))?;

    let db = DbConfig {
        host: required("DB_HOST")?,
        name: required("DB_NAME")?,
        user: required("DB_USER")?,
        password: required("DB_PASS")?,
        port,
    };

    let level = LogLevel::from_name(&file.logging.level).ok_or_else(|| {
        PipelineError::Config(format!("unknown log level: {}", file.logging.level))
    })?;

    let weather = WeatherConfig {
        base_url: file.weather.base_url,
        cache_dir: PathBuf::from(file.weather.cache_dir),
        cache_ttl: file
            .weather
            .cache_ttl_hours
            .map(|h| Duration::from_secs(h.saturating_mul(3600))),
        retry: RetryPolicy {
            max_retries: file.weather.max_retries,
            base_delay: Duration::from_millis(file.weather.backoff_base_ms),
        },
        timeout: Duration::from_secs(file.weather.timeout_secs),
    };

    let model = ModelConfig {
        api_key: required("GEMINI_API_KEY")?,
        name: file.model.name,
        timeout: Duration::from_secs(file.model.timeout_secs),
        retry: RetryPolicy {
            max_retries: file.model.max_retries,
            ..RetryPolicy::model_default()
        },
    };

    Ok(Config {
        db,
        weather,
        model,
        logging: LoggingConfig {
            level,
            file: file.logging.file,
            timestamps: file.logging.timestamps,
        },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
