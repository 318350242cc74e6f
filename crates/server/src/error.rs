//! Structured errors for the tile-proxy server.
//!
//! Core errors carry their own status mapping; the message goes in the body
//! and the status line keeps its standard reason phrase.

use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tileproxy_core::Error;

/// Methods the proxy answers.
pub const ALLOWED_METHODS: &str = "GET, HEAD, OPTIONS";

/// Structured errors for the tile-proxy server.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Failure anywhere in the tile pipeline.
    #[error(transparent)]
    Tile(#[from] Error),

    /// Only GET, HEAD and OPTIONS are served.
    #[error("METHOD_NOT_ALLOWED: {0}")]
    MethodNotAllowed(Method),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Tile(err) => {
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Tile(err) => err.kind(),
            ProxyError::MethodNotAllowed(_) => "method",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, self.to_string()).into_response();

        if matches!(self, ProxyError::MethodNotAllowed(_)) {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tileproxy_core::QueryError;

    #[test]
    fn test_query_error_is_bad_request() {
        let err = ProxyError::from(Error::from(QueryError::MissingUrl));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "query");
    }

    #[test]
    fn test_upstream_error_is_bad_gateway() {
        let err = ProxyError::from(Error::Upstream { status: 404, url: "http://a/b.png".into() });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.status().canonical_reason(), Some("Bad Gateway"));
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_method_not_allowed_sets_allow() {
        let response = ProxyError::MethodNotAllowed(Method::POST).into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), ALLOWED_METHODS);
    }
}
