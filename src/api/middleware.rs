//! Request correlation and CORS
//!
//! Every HTTP request carries an id: the client's `x-request-id` when it is
//! usable, a fresh UUID otherwise. Handlers read it from the extensions to
//! tag error bodies, and everything logged while the request runs sits
//! inside a `request` span carrying the same id.

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::{fmt, time::Instant};
use tower_http::cors::{Any, CorsLayer, ExposeHeaders};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

/// Request ID header key
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied id kept as is
const MAX_CLIENT_ID_LEN: usize = 128;

/// Correlation id for one HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// Reuse the client's id when it is printable and short, else mint one
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.len() <= MAX_CLIENT_ID_LEN)
            .map(|id| RequestId(id.to_string()))
            .unwrap_or_else(Self::generate)
    }

    pub fn generate() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// CORS for the wallet API. `*` or an empty list opens it to any origin.
pub fn create_cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_headers(Any)
        .expose_headers(ExposeHeaders::list([HeaderName::from_static(REQUEST_ID_HEADER)]));

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any).allow_methods(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring unparsable CORS origin {:?}", o);
                None
            }
        })
        .collect();

    // Deposit and withdraw are POSTs, health and metrics are GETs
    layer
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
}

/// Attach a request id, run the request inside its span, echo the id back
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::from_headers(request.headers());
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    request.extensions_mut().insert(request_id.clone());

    let started = Instant::now();
    let mut response = async move {
        let response = next.run(request).await;
        debug!(
            "Completed with {} in {:?}",
            response.status(),
            started.elapsed()
        );
        response
    }
    .instrument(span)
    .await;

    if let Ok(value) = HeaderValue::from_str(&request_id.0) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
