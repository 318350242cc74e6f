//! Unified error types for tile-proxy.
//!
//! Every failure on the request path is one of four kinds. Each kind maps to
//! exactly one HTTP status via [`Error::status_code`].

use std::io;
use std::path::Path;

use crate::cache::QueryError;

/// Unified error types for the tile-proxy pipeline.
///
/// `Clone` so the outcome of one in-flight fetch can be handed to every
/// request waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Missing or malformed `url` query parameter.
    #[error("QUERY_ERROR: {0}")]
    Query(#[from] QueryError),

    /// Origin answered with a non-success status.
    #[error("UPSTREAM_ERROR: response status was {status} on url {url}")]
    Upstream { status: u16, url: String },

    /// Network failure contacting or reading from the origin.
    #[error("TRANSPORT_ERROR: {message} (url: {url})")]
    Transport { url: String, message: String },

    /// Filesystem failure creating, writing, renaming or reading a cache file.
    #[error("STORAGE_ERROR: {message} (path: {path})")]
    Storage { path: String, message: String },
}

impl Error {
    pub fn transport(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::Transport { url: url.into(), message: err.to_string() }
    }

    pub fn storage(path: &Path, err: io::Error) -> Self {
        Error::Storage { path: path.display().to_string(), message: err.to_string() }
    }

    /// HTTP status for this error kind.
    ///
    /// Client-caused failures are 4xx; origin failures are 502; local disk
    /// failures are 500.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Query(_) => 400,
            Error::Upstream { .. } | Error::Transport { .. } => 502,
            Error::Storage { .. } => 500,
        }
    }

    /// Short machine-readable kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Query(_) => "query",
            Error::Upstream { .. } => "upstream",
            Error::Transport { .. } => "transport",
            Error::Storage { .. } => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Upstream { status: 404, url: "http://tiles.example/z/3/4.png".to_string() };
        assert!(err.to_string().contains("UPSTREAM_ERROR"));
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("http://tiles.example/z/3/4.png"));
    }

    #[test]
    fn test_query_error_is_client_error() {
        let err: Error = QueryError::MissingQuery.into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.kind(), "query");
    }

    #[test]
    fn test_status_codes_by_kind() {
        let upstream = Error::Upstream { status: 500, url: "http://a/b".into() };
        let transport = Error::transport("http://a/b", "connection refused");
        let storage = Error::storage(Path::new("/cache/a/b"), io::Error::other("disk full"));

        assert_eq!(upstream.status_code(), 502);
        assert_eq!(transport.status_code(), 502);
        assert_eq!(storage.status_code(), 500);
    }

    #[test]
    fn test_storage_error_carries_path() {
        let err = Error::storage(Path::new("/cache/a/b.png"), io::Error::other("denied"));
        let msg = err.to_string();
        assert!(msg.contains("/cache/a/b.png"));
        assert!(msg.contains("denied"));
    }
}
