//! Tower middleware wrapped around every HTTP route.
//!
//! Layers are listed outermost first. Layers that synthesize their own
//! responses (CORS preflight, timeout) need a `Default` response body, so
//! they sit inside the layers that rewrap the body (body limit,
//! decompression, compression).

use axum::http::header::HeaderName;
use axum::http::{Method, StatusCode};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;

const REQUEST_ID: &str = "x-request-id";

/// Wraps `router` in the HTTP stack configured by `config`:
///
/// 1. `SetRequestId` assigns a UUID `x-request-id` unless the client sent one
/// 2. `Trace` opens a span per request
/// 3. `Compression` gzips responses the client accepts compressed
/// 4. `RequestBodyLimit` answers 413 when the declared or streamed body
///    exceeds `max_body_bytes` (measured before decompression)
/// 5. `RequestDecompression` inflates gzip request bodies and strips
///    `content-encoding`; unsupported encodings get 415
/// 6. `CORS` for the configured origins, every verb an operation accepts
/// 7. `Timeout` answers 408 past `request_timeout`
/// 8. `PropagateRequestId` copies `x-request-id` onto the response
pub fn apply_http_layers<S>(router: Router<S>, config: &NetworkConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let request_id = HeaderName::from_static(REQUEST_ID);
    let layers = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(RequestDecompressionLayer::new())
        .layer(cors_layer(&config.cors_origins))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(request_id));
    router.layer(layers)
}

/// `"*"` anywhere in `origins` allows every origin; otherwise only the
/// entries that parse as header values are allowed.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| o.parse().ok()))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}
