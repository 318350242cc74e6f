//! Core types and shared functionality for tile-proxy.
//!
//! This crate provides:
//! - Cache key resolution and lazy freshness evaluation
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheKey, Freshness, FreshnessPolicy, QueryError, TileRequest};
pub use config::{AgeUnit, AppConfig, ConfigError};
pub use error::Error;
