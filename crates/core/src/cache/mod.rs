//! On-disk tile mirror: cache keys and lazy freshness.
//!
//! There is no index or in-memory table. A cache entry is whatever file sits
//! at the path derived from the origin URL, and its validity is recomputed
//! from the filesystem on every access.

pub mod freshness;
pub mod key;

pub use freshness::{Freshness, FreshnessPolicy};
pub use key::{CacheKey, QueryError, TileRequest};
