//! Per-request orchestration for the tile proxy.
//!
//! Every request, whatever its path, is resolved from its `url` query
//! parameter and answered either from the cache file or by a live fetch that
//! fills the cache while streaming to the client.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures_util::stream;
use tokio::fs::File;
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;

use tileproxy_client::{ClientStream, FetchClient, FetchConfig, Flight, FlightLeader, FlightRegistry, client_channel};
use tileproxy_core::{AppConfig, Error, FreshnessPolicy, TileRequest};

use crate::error::ProxyError;
use crate::headers;

/// Chunks buffered between the download task and the client connection.
const BODY_CHANNEL_DEPTH: usize = 16;

/// Shared, read-only state for all requests.
#[derive(Debug)]
pub struct ProxyState {
    work_dir: PathBuf,
    policy: FreshnessPolicy,
    cache_control: HeaderValue,
    fetcher: FetchClient,
    flights: FlightRegistry,
}

impl ProxyState {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            work_dir: config.work_dir.clone(),
            policy: config.freshness_policy(),
            cache_control: HeaderValue::from_str(&config.cache_control)?,
            fetcher: FetchClient::new(FetchConfig::from(config))?,
            flights: FlightRegistry::new(),
        })
    }
}

/// Build the router. Every path is handled the same way.
pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new().fallback(proxy_tile).with_state(state)
}

async fn proxy_tile(
    State(state): State<Arc<ProxyState>>, method: Method, uri: Uri, request_headers: HeaderMap,
) -> Response {
    let result = match method {
        Method::OPTIONS => Ok(StatusCode::NO_CONTENT.into_response()),
        Method::GET | Method::HEAD => serve_tile(&state, uri.query()).await,
        other => Err(ProxyError::MethodNotAllowed(other)),
    };

    let mut response = result.unwrap_or_else(|err| {
        tracing::warn!(kind = err.kind(), status = err.status().as_u16(), error = %err, "request failed");
        err.into_response()
    });

    headers::apply(response.headers_mut(), &request_headers, &state.cache_control);
    response
}

async fn serve_tile(state: &Arc<ProxyState>, query: Option<&str>) -> Result<Response, ProxyError> {
    let tile = TileRequest::from_query(query, &state.work_dir).map_err(Error::from)?;

    let freshness = state.policy.evaluate(&tile.cache_path).await;
    tracing::debug!(
        url = %tile.origin,
        file = %tile.cache_path.display(),
        freshness = freshness.label(),
        "resolved tile"
    );

    if freshness.is_hit() {
        return serve_cached(&tile).await;
    }

    match state.flights.join(&tile.cache_path, tile.origin.as_str()) {
        Flight::Follower(follower) => {
            follower.wait().await?;
            serve_cached(&tile).await
        }
        Flight::Leader(leader) => {
            tracing::debug!(url = %tile.origin, in_flight = state.flights.len(), "leading fetch");

            // Detached: a client hangup must not cancel the fetch followers wait on.
            let (reply, started) = oneshot::channel();
            tokio::spawn(lead_fetch(Arc::clone(state), tile.clone(), leader, reply));

            match started.await {
                Ok(Ok(LeadStart::Cached)) => serve_cached(&tile).await,
                Ok(Ok(LeadStart::Streaming { content_length, body })) => {
                    let chunks =
                        stream::unfold(body, |mut rx| async move { rx.recv().await.map(|chunk| (chunk, rx)) });
                    Ok(tile_response(&tile.content_type, content_length, Body::from_stream(chunks)))
                }
                Ok(Err(err)) => Err(err.into()),
                Err(_) => {
                    let err = Error::transport(tile.origin.as_str(), "fetch task ended before the origin answered");
                    Err(err.into())
                }
            }
        }
    }
}

async fn serve_cached(tile: &TileRequest) -> Result<Response, ProxyError> {
    let path = &tile.cache_path;
    let file = File::open(path).await.map_err(|e| Error::storage(path, e))?;
    let len = file.metadata().await.map_err(|e| Error::storage(path, e))?.len();

    tracing::debug!(file = %path.display(), bytes = len, "serving from cache");

    let body = Body::from_stream(ReaderStream::new(file));
    Ok(tile_response(&tile.content_type, Some(len), body))
}

/// What the leader task hands back once the origin has answered.
enum LeadStart {
    /// A flight that just ended refreshed the entry; serve it from disk.
    Cached,
    /// The origin answered with success; the body arrives on `body`.
    Streaming { content_length: Option<u64>, body: ClientStream },
}

/// Run one cache fill to completion, whether or not the requester is still there.
async fn lead_fetch(
    state: Arc<ProxyState>, tile: TileRequest, leader: FlightLeader, reply: oneshot::Sender<Result<LeadStart, Error>>,
) {
    if state.policy.evaluate(&tile.cache_path).await.is_hit() {
        leader.finish(Ok(()));
        let _ = reply.send(Ok(LeadStart::Cached));
        return;
    }

    let download = match state.fetcher.begin(&tile.origin, &tile.cache_path).await {
        Ok(download) => download,
        Err(err) => {
            leader.finish(Err(err.clone()));
            let _ = reply.send(Err(err));
            return;
        }
    };

    let (tx, rx) = client_channel(BODY_CHANNEL_DEPTH);
    let content_length = download.content_length();
    if reply.send(Ok(LeadStart::Streaming { content_length, body: rx })).is_err() {
        tracing::debug!(url = download.url(), "requester left before the origin answered");
    }

    let file = download.dest().to_path_buf();
    let outcome = download.stream_into(tx).await;
    if let Err(err) = &outcome {
        tracing::warn!(kind = err.kind(), file = %file.display(), error = %err, "fetch failed mid-stream");
    }
    leader.finish(outcome.map(|_| ()));
}

fn tile_response(content_type: &str, content_length: Option<u64>, body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();

    let content_type = HeaderValue::from_str(content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(tileproxy_core::cache::key::FALLBACK_CONTENT_TYPE));
    headers.insert(CONTENT_TYPE, content_type);
    if let Some(len) = content_length {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }

    response
}
