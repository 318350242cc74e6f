//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_control` is empty or not a valid header value
    /// - `user_agent` is empty or not a valid header value
    /// - `max_cache_age` is 0
    /// - `work_dir` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_control.is_empty() {
            return Err(ConfigError::Invalid { field: "cache_control".into(), reason: "must not be empty".into() });
        }
        if !is_header_safe(&self.cache_control) {
            return Err(ConfigError::Invalid {
                field: "cache_control".into(),
                reason: "must be visible ASCII (valid header value)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }
        if !is_header_safe(&self.user_agent) {
            return Err(ConfigError::Invalid {
                field: "user_agent".into(),
                reason: "must be visible ASCII (valid header value)".into(),
            });
        }

        if self.max_cache_age == 0 {
            return Err(ConfigError::Invalid {
                field: "max_cache_age".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.work_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid { field: "work_dir".into(), reason: "must not be empty".into() });
        }

        if self.min_size == 0 {
            tracing::warn!("min_size is 0; empty cache files from failed downloads will still be rejected");
        }

        Ok(())
    }
}

fn is_header_safe(value: &str) -> bool {
    value.bytes().all(|b| b == b' ' || b == b'\t' || b.is_ascii_graphic())
}
