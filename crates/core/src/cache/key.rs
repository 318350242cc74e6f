//! Cache key resolution for proxied tile requests.
//!
//! An inbound request carries the full origin URL in its `url` query
//! parameter. The URL is decomposed into `(authority, relative path)` and the
//! cache file lives at `<work_dir>/<authority>/<relative path>`.

use std::path::{Component, Path, PathBuf};

use url::{Url, form_urlencoded};

/// File name used when the origin URL ends in `/`.
///
/// Raw braces are always percent-encoded in URL paths, so no origin path can
/// produce this segment.
const INDEX_FILE: &str = "{index}";

/// Content type used when the extension has no known mapping.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Error type for query decomposition failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("can't find query")]
    MissingQuery,

    #[error("can't find url parameter in query")]
    MissingUrl,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("url has no authority: {0}")]
    MissingAuthority(String),

    #[error("url does not map to a safe cache path: {0}")]
    UnsafePath(String),
}

/// The `(authority, relative path)` pair identifying a cached tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// `host[:port]` of the origin. Userinfo is never part of the key.
    pub authority: String,
    /// Origin path without its leading `/`, still percent-encoded, with the
    /// origin query (if any) appended as `?query` with `%` and `/` escaped.
    pub relative_path: String,
}

impl CacheKey {
    /// Derive the cache key for an already-validated origin URL.
    pub fn from_url(url: &Url) -> Result<Self, QueryError> {
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| QueryError::MissingAuthority(url.to_string()))?;

        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let path = url.path();
        let mut relative_path = path.strip_prefix('/').unwrap_or(path).to_string();
        if relative_path.is_empty() || relative_path.ends_with('/') {
            relative_path.push_str(INDEX_FILE);
        }
        if let Some(query) = url.query() {
            relative_path.push('?');
            relative_path.push_str(&escape_query(query));
        }

        let key = Self { authority, relative_path };
        key.ensure_contained()?;
        Ok(key)
    }

    /// Cache file path for this key under `work_dir`.
    pub fn path_in(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(&self.authority).join(&self.relative_path)
    }

    /// Every component must be a plain name so the joined path stays inside
    /// the work directory and distinct keys never normalize to the same file.
    fn ensure_contained(&self) -> Result<(), QueryError> {
        let authority_ok = is_single_normal(&self.authority);
        let relative_ok = !self.relative_path.contains("//")
            && Path::new(&self.relative_path)
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if authority_ok && relative_ok {
            Ok(())
        } else {
            Err(QueryError::UnsafePath(format!("{}/{}", self.authority, self.relative_path)))
        }
    }
}

/// Escape `%` before `/` so the query stays a single file name and the
/// mapping remains reversible.
fn escape_query(query: &str) -> String {
    query.replace('%', "%25").replace('/', "%2F")
}

fn is_single_normal(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!((components.next(), components.next()), (Some(Component::Normal(_)), None))
}

/// A request-scoped, fully resolved tile request.
#[derive(Debug, Clone)]
pub struct TileRequest {
    pub origin: Url,
    pub key: CacheKey,
    pub cache_path: PathBuf,
    pub content_type: String,
}

impl TileRequest {
    /// Resolve a tile request from the raw query string of an inbound request.
    ///
    /// Only the `url` parameter is meaningful; everything else is ignored.
    pub fn from_query(query: Option<&str>, work_dir: &Path) -> Result<Self, QueryError> {
        let query = query.filter(|q| !q.is_empty()).ok_or(QueryError::MissingQuery)?;

        let origin = form_urlencoded::parse(query.as_bytes())
            .find(|(name, _)| name == "url")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.trim().is_empty())
            .ok_or(QueryError::MissingUrl)?;

        Self::from_origin(&origin, work_dir)
    }

    /// Resolve a tile request from an origin URL string.
    pub fn from_origin(origin: &str, work_dir: &Path) -> Result<Self, QueryError> {
        let origin = parse_origin(origin)?;
        let key = CacheKey::from_url(&origin)?;
        let cache_path = key.path_in(work_dir);
        let content_type = content_type_for(origin.path());

        Ok(Self { origin, key, cache_path, content_type })
    }
}

/// Parse and validate `scheme://authority/path`.
fn parse_origin(input: &str) -> Result<Url, QueryError> {
    let trimmed = input.trim();

    let url = Url::parse(trimmed).map_err(|e| QueryError::InvalidUrl(format!("{trimmed}: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(QueryError::UnsupportedScheme(scheme.to_string())),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(QueryError::MissingAuthority(trimmed.to_string()));
    }

    Ok(url)
}

/// Content type for a URL path, looked up by file extension.
pub fn content_type_for(path: &str) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string()
}
