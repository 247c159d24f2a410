//! Static CORS headers
//!
//! Every response, including errors and preflights, carries the same four
//! permissive headers. Preflight requests are answered without looking at
//! the body.

use axum::http::{
    header::{
        ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
        ACCESS_CONTROL_MAX_AGE,
    },
    HeaderName, HeaderValue, StatusCode,
};
use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;

/// Preflight cache lifetime in seconds
pub const MAX_AGE_SECS: &str = "3600";

type HeaderLayer = SetResponseHeaderLayer<HeaderValue>;

/// Layer stack that overrides the four CORS headers on every response
pub type CorsLayer =
    ServiceBuilder<Stack<HeaderLayer, Stack<HeaderLayer, Stack<HeaderLayer, Stack<HeaderLayer, Identity>>>>>;

/// The CORS header set, allowing `Content-Type` and the configured API key header
pub fn cors_headers(api_key_header: &str) -> [(HeaderName, HeaderValue); 4] {
    let allow_headers = HeaderValue::from_str(&format!("Content-Type, {}", api_key_header))
        .unwrap_or_else(|_| {
            tracing::warn!(header = api_key_header, "Invalid API key header name, ignoring");
            HeaderValue::from_static("Content-Type")
        });

    [
        (ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
        (
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        ),
        (ACCESS_CONTROL_ALLOW_HEADERS, allow_headers),
        (ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE_SECS)),
    ]
}

/// Build the layer stack for `cors_headers(api_key_header)`
pub fn cors_layer(api_key_header: &str) -> CorsLayer {
    let [origin, methods, headers, max_age] = cors_headers(api_key_header);
    ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(origin.0, origin.1))
        .layer(SetResponseHeaderLayer::overriding(methods.0, methods.1))
        .layer(SetResponseHeaderLayer::overriding(headers.0, headers.1))
        .layer(SetResponseHeaderLayer::overriding(max_age.0, max_age.1))
}

/// Preflight answer: no body, headers added by `cors_layer`
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}
