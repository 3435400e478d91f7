//! HTTP router and the catch-all forward handler
//!
//! Every inbound request is rewritten to `{upstream_base}/{path}?{query}` and
//! relayed with streaming body semantics; the upstream response is mirrored
//! back verbatim. The proxy holds no per-request state and never retries --
//! recovery from upstream failures is the caller's responsibility.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderName, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, warn};
use url::Url;

/// Shared application state
pub struct AppState {
    /// Upstream base URL, resolved once at startup
    pub upstream: Url,
    /// HTTP client used for all upstream requests
    pub http: reqwest::Client,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    // `get` also matches HEAD; together this covers the six supported methods.
    let forward = get(forward_handler)
        .post(forward_handler)
        .put(forward_handler)
        .patch(forward_handler)
        .delete(forward_handler);

    Router::new()
        .route("/health", get(health_handler))
        .route("/", forward.clone())
        .route("/{*path}", forward)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "upstream": state.upstream.as_str(),
    }))
}

/// Catch-all proxy handler
async fn forward_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let target = upstream_url(&state.upstream, request.uri());
    let method = request.method().clone();
    let started = Instant::now();

    match forward(&state, &target, request).await {
        Ok(response) => {
            debug!(
                method = %method,
                target = %target,
                status = response.status().as_u16(),
                elapsed = ?started.elapsed(),
                "Forwarded request"
            );
            response
        }
        Err(e) => {
            warn!(method = %method, target = %target, error = %e, "Upstream request failed");
            proxy_error(&target)
        }
    }
}

/// Build the upstream URL from the configured base and the inbound URI.
/// The raw query string is appended untouched so repeated keys keep their
/// original multiplicity and ordering.
fn upstream_url(base: &Url, uri: &Uri) -> String {
    let mut target = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        uri.path().trim_start_matches('/')
    );
    if let Some(query) = uri.query() {
        target.push('?');
        target.push_str(query);
    }
    target
}

/// Forward a single request to the upstream and mirror its response.
async fn forward(
    state: &AppState,
    target: &str,
    request: Request,
) -> Result<Response, reqwest::Error> {
    let (parts, body) = request.into_parts();

    let mut outbound = state.http.request(parts.method.clone(), target);

    for (name, value) in &parts.headers {
        if skip_request_header(name) {
            continue;
        }
        outbound = outbound.header(name, value);
    }

    // GET/HEAD carry no body; everything else is streamed through so large
    // uploads never require buffering the full payload.
    if !matches!(parts.method, Method::GET | Method::HEAD) {
        outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let upstream = outbound.send().await?;

    let mut response = Response::builder().status(upstream.status());
    if let Some(headers) = response.headers_mut() {
        for (name, value) in upstream.headers() {
            if skip_response_header(name) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
    }

    let body = Body::from_stream(upstream.bytes_stream());
    Ok(response
        .body(body)
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response()))
}

/// Request headers the transport layer owns: Content-Length must be
/// recomputed for the streamed body, and Host must name the upstream.
fn skip_request_header(name: &HeaderName) -> bool {
    name == header::HOST
        || name == header::CONTENT_LENGTH
        || name == header::TRANSFER_ENCODING
        || name == header::CONNECTION
}

/// Response framing headers the transport layer owns.
fn skip_response_header(name: &HeaderName) -> bool {
    name == header::TRANSFER_ENCODING || name == header::CONNECTION
}

// ============================================================================
// Error envelope
// ============================================================================

/// Fixed failure envelope returned when the upstream itself is unreachable.
#[derive(Debug, Serialize)]
struct ProxyErrorEnvelope {
    error: &'static str,
    status: u16,
    timestamp: String,
    path: String,
    details: Vec<String>,
}

/// Build the HTTP 500 `BffProxyError` response for a failed forward.
fn proxy_error(path: &str) -> Response {
    let envelope = ProxyErrorEnvelope {
        error: "BffProxyError",
        status: 500,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        path: path.to_string(),
        details: Vec::new(),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(envelope)).into_response()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn base() -> Url {
        Url::parse("http://backend:8080/api/").unwrap()
    }

    // ── Upstream URL construction ──────────────────────────────────────

    #[test]
    fn upstream_url_joins_path() {
        let uri: Uri = "/boards/42".parse().unwrap();
        assert_eq!(
            upstream_url(&base(), &uri),
            "http://backend:8080/api/boards/42"
        );
    }

    #[test]
    fn upstream_url_preserves_query_multiplicity() {
        let uri: Uri = "/cards?tag=a&tag=b&sort=desc".parse().unwrap();
        assert_eq!(
            upstream_url(&base(), &uri),
            "http://backend:8080/api/cards?tag=a&tag=b&sort=desc"
        );
    }

    #[test]
    fn upstream_url_handles_root_path() {
        let uri: Uri = "/".parse().unwrap();
        assert_eq!(upstream_url(&base(), &uri), "http://backend:8080/api/");
    }

    #[test]
    fn upstream_url_keeps_encoded_segments() {
        let uri: Uri = "/boards/42/columns?name=In%20Progress".parse().unwrap();
        assert_eq!(
            upstream_url(&base(), &uri),
            "http://backend:8080/api/boards/42/columns?name=In%20Progress"
        );
    }

    // ── Header filtering ───────────────────────────────────────────────

    #[test]
    fn content_length_is_not_forwarded() {
        assert!(skip_request_header(&header::CONTENT_LENGTH));
        assert!(skip_request_header(&header::HOST));
        assert!(skip_request_header(&header::TRANSFER_ENCODING));
    }

    #[test]
    fn application_headers_are_forwarded() {
        assert!(!skip_request_header(&header::AUTHORIZATION));
        assert!(!skip_request_header(&header::CONTENT_TYPE));
        assert!(!skip_request_header(&HeaderName::from_static(
            "x-board-client"
        )));
    }

    #[test]
    fn response_content_length_is_mirrored() {
        assert!(!skip_response_header(&header::CONTENT_LENGTH));
        assert!(skip_response_header(&header::TRANSFER_ENCODING));
    }

    // ── Error envelope ─────────────────────────────────────────────────

    #[test]
    fn proxy_error_envelope_shape() {
        let envelope = ProxyErrorEnvelope {
            error: "BffProxyError",
            status: 500,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            path: "http://backend:8080/api/boards".to_string(),
            details: Vec::new(),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["error"], "BffProxyError");
        assert_eq!(value["status"], 500);
        assert_eq!(value["details"], serde_json::json!([]));
        // Timestamp must be well-formed ISO-8601
        let ts = value["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }
}
