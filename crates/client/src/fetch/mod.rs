//! Outbound fetch pipeline for the tile mirror.
//!
//! ### Dual-sink download
//! - Ensure the destination directory exists, then GET the origin.
//! - Non-success status fails before any byte reaches disk or client.
//! - The body is forwarded chunk by chunk to a private temp file and to the
//!   client, then renamed onto the cache path once durable.
//! - Any failure removes the temp file and the destination before reporting.
//!
//! ### Single writer per key
//! - [`FlightRegistry`] lets late requests for the same cache path await the
//!   first fetch instead of racing it.

pub mod flight;
pub mod sink;

use std::path::Path;

use reqwest::Client;
use url::Url;

pub use flight::{Flight, FlightFollower, FlightLeader, FlightOutcome, FlightRegistry};
pub use sink::{ClientSink, ClientStream, Download, client_channel};

use tileproxy_core::{AppConfig, Error};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "Mozilla/5.0")
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "Mozilla/5.0".to_string() }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone() }
    }
}

/// HTTP client for origin fetches.
///
/// Content decoding is disabled so the mirror stores exactly the bytes the
/// origin sent. There is no request deadline.
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: Client,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::transport("<client>", format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http })
    }

    /// Start mirroring `origin` into `dest`.
    ///
    /// Resolves once the origin has answered with a success status and a temp
    /// file is ready beside `dest`; the body is moved by
    /// [`Download::stream_into`]. On any failure here, nothing has been sent
    /// to the client and no file is left at `dest`.
    pub async fn begin(&self, origin: &Url, dest: &Path) -> Result<Download, Error> {
        let url = origin.as_str();

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(parent, e))?;
        }

        tracing::info!(url, file = %dest.display(), "caching");

        let response = match self.http.get(origin.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                sink::discard(dest).await;
                return Err(Error::transport(url, format!("network error: {e}")));
            }
        };

        let status = response.status();
        if !status.is_success() {
            sink::discard(dest).await;
            return Err(Error::Upstream { status: status.as_u16(), url: url.to_string() });
        }

        match Download::open(origin, dest, response).await {
            Ok(download) => Ok(download),
            Err(e) => {
                sink::discard(dest).await;
                Err(e)
            }
        }
    }
}
