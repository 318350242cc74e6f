//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TILE_PROXY_*)
//! 2. TOML config file (if TILE_PROXY_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The loaded value is immutable: it is built once at startup and shared
//! read-only by every request.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::FreshnessPolicy;

mod validation;

pub use validation::ConfigError;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Unit in which `max_cache_age` is expressed.
///
/// The historical deployment divided the file age in milliseconds by
/// `1000 * 3600 * 24 * 60`, so its "days" were really 60-day intervals.
/// That literal interval is kept as the default; `day` is the conventional
/// 86 400 s reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeUnit {
    #[default]
    SixtyDays,
    Day,
}

impl AgeUnit {
    pub fn seconds(self) -> u64 {
        match self {
            AgeUnit::SixtyDays => 60 * SECS_PER_DAY,
            AgeUnit::Day => SECS_PER_DAY,
        }
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (TILE_PROXY_*)
/// 2. TOML config file (if TILE_PROXY_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address to bind the listener to.
    ///
    /// Set via TILE_PROXY_HOST environment variable.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listening port.
    ///
    /// Set via TILE_PROXY_PORT environment variable.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Root of the on-disk tile mirror.
    ///
    /// Set via TILE_PROXY_WORK_DIR environment variable.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Cache-Control value sent with every response.
    ///
    /// Set via TILE_PROXY_CACHE_CONTROL environment variable.
    #[serde(default = "default_cache_control")]
    pub cache_control: String,

    /// Cache files of this many bytes or fewer are never trusted.
    ///
    /// Set via TILE_PROXY_MIN_SIZE environment variable.
    #[serde(default = "default_min_size")]
    pub min_size: u64,

    /// Maximum cache age, counted in `age_unit`s.
    ///
    /// Set via TILE_PROXY_MAX_CACHE_AGE environment variable.
    #[serde(default = "default_max_cache_age")]
    pub max_cache_age: u64,

    /// Unit of `max_cache_age` (`sixty_days` or `day`).
    ///
    /// Set via TILE_PROXY_AGE_UNIT environment variable.
    #[serde(default)]
    pub age_unit: AgeUnit,

    /// User-Agent sent to origins. Some tile servers reject bot-like clients.
    ///
    /// Set via TILE_PROXY_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    3005
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./tilecache")
}

fn default_cache_control() -> String {
    "public, max-age=8640000".into()
}

fn default_min_size() -> u64 {
    200
}

fn default_max_cache_age() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            work_dir: default_work_dir(),
            cache_control: default_cache_control(),
            min_size: default_min_size(),
            max_cache_age: default_max_cache_age(),
            age_unit: AgeUnit::default(),
            user_agent: default_user_agent(),
        }
    }
}

impl AppConfig {
    /// Maximum cache age as a Duration.
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.age_unit.seconds().saturating_mul(self.max_cache_age))
    }

    /// Freshness thresholds derived from this configuration.
    pub fn freshness_policy(&self) -> FreshnessPolicy {
        FreshnessPolicy { min_size: self.min_size, max_age: self.max_age() }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TILE_PROXY_`
    /// 2. TOML file from `TILE_PROXY_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TILE_PROXY_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TILE_PROXY_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3005);
        assert_eq!(config.work_dir, PathBuf::from("./tilecache"));
        assert_eq!(config.cache_control, "public, max-age=8640000");
        assert_eq!(config.min_size, 200);
        assert_eq!(config.max_cache_age, 30);
        assert_eq!(config.age_unit, AgeUnit::SixtyDays);
        assert_eq!(config.user_agent, "Mozilla/5.0");
    }

    #[test]
    fn test_max_age_literal_interval() {
        let config = AppConfig::default();
        assert_eq!(config.max_age(), Duration::from_secs(30 * 60 * 86_400));
    }

    #[test]
    fn test_max_age_days() {
        let config = AppConfig { age_unit: AgeUnit::Day, ..Default::default() };
        assert_eq!(config.max_age(), Duration::from_secs(30 * 86_400));
    }

    #[test]
    fn test_freshness_policy_from_config() {
        let config = AppConfig { min_size: 10, max_cache_age: 2, age_unit: AgeUnit::Day, ..Default::default() };
        let policy = config.freshness_policy();
        assert_eq!(policy.min_size, 10);
        assert_eq!(policy.max_age, Duration::from_secs(2 * 86_400));
    }

    #[test]
    fn test_age_unit_from_toml() {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string("age_unit = \"day\"\nport = 8080"))
            .extract()
            .unwrap();
        assert_eq!(config.age_unit, AgeUnit::Day);
        assert_eq!(config.port, 8080);
        assert_eq!(config.min_size, 200);
    }
}
