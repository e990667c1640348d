use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;
use dotenvy::dotenv;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_addr: String,
    pub api_prefix: String,

    // Rate limiting
    pub rate_api_per_min: u32,

    pub log_dir: PathBuf,
    pub log_level: tracing::Level,

    /// Local time of the daily reconciliation
    pub reconcile_at: NaiveTime,
    pub holidays_file: PathBuf,
    pub vacations_file: PathBuf,

    pub reader_enabled: bool,
    pub enrollment_cache_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        Ok(Self {
            database_url: env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            server_addr: var_or("SERVER_ADDR", "127.0.0.1:8081"),
            api_prefix: var_or("API_PREFIX", "/api"),
            rate_api_per_min: parse_or("RATE_API_PER_MIN", 600)?,
            log_dir: var_or("LOG_DIR", "logs").into(),
            log_level: parse_or("LOG_LEVEL", tracing::Level::DEBUG)?,
            reconcile_at: parse_time("RECONCILE_AT", &var_or("RECONCILE_AT", "00:05"))?,
            holidays_file: var_or("HOLIDAYS_FILE", "data/festivos.txt").into(),
            vacations_file: var_or("VACATIONS_FILE", "data/vacaciones.txt").into(),
            reader_enabled: parse_bool("READER_ENABLED", &var_or("READER_ENABLED", "true"))?,
            enrollment_cache_ttl: Duration::from_secs(parse_or("ENROLLMENT_CACHE_TTL_SECS", 300)?),
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

fn parse_time(key: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
    }
}
