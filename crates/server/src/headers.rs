//! Response headers attached to every proxied response, whatever the outcome.

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, CACHE_CONTROL, HeaderName,
};
use axum::http::{HeaderMap, HeaderValue};

/// Allow any origin, echo the preflight request lists, and set Cache-Control.
pub fn apply(response: &mut HeaderMap, request: &HeaderMap, cache_control: &HeaderValue) {
    response.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response.insert(ACCESS_CONTROL_ALLOW_METHODS, echo(request, ACCESS_CONTROL_REQUEST_METHOD));
    response.insert(ACCESS_CONTROL_ALLOW_HEADERS, echo(request, ACCESS_CONTROL_REQUEST_HEADERS));
    response.insert(CACHE_CONTROL, cache_control.clone());
}

fn echo(request: &HeaderMap, name: HeaderName) -> HeaderValue {
    request
        .get(name)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(""))
}
