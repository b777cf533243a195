//! Plain HTTP on the relay port: CORS preflight and JSON echo.
//!
//! Editors running in a browser probe the relay with ordinary HTTP before
//! opening the WebSocket.  The relay answers just enough of it:
//!
//! | Method    | Response                                             |
//! |-----------|------------------------------------------------------|
//! | `OPTIONS` | `200`, empty body                                    |
//! | `POST`    | `200` with the JSON body echoed, `400` if not JSON   |
//! | other     | `405` (from the method router)                       |
//!
//! [`cors_layers`] puts `Access-Control-Allow-Origin` for the one configured
//! origin and `Access-Control-Allow-Headers: Content-Type` on every response,
//! including the `405`s and the WebSocket upgrade.

use axum::body::Bytes;
use axum::http::header::{HeaderValue, InvalidHeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, CONTENT_TYPE};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::IgnoredAny;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, warn};

use crate::application::RelayError;

/// Largest request body the relay will read; larger bodies get `413`.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// `OPTIONS`: an empty `200`.
///
/// The CORS layer in front of the router answers preflights itself; this
/// covers any `OPTIONS` that reaches the routes.
pub async fn preflight() -> StatusCode {
    debug!("HTTP OPTIONS");
    StatusCode::OK
}

/// `POST`: echoes the body unchanged if it is valid JSON.
///
/// The body is only validated, never re-serialized, so key order and number
/// formatting come back exactly as sent.
pub async fn echo(body: Bytes) -> Response {
    match serde_json::from_slice::<IgnoredAny>(&body) {
        Ok(_) => {
            debug!("HTTP POST: echoing {} bytes", body.len());
            ([(CONTENT_TYPE, HeaderValue::from_static("application/json"))], body).into_response()
        }
        Err(e) => {
            warn!("HTTP POST: body is not JSON: {e}");
            let detail = RelayError::Decode(e.to_string()).detail();
            (StatusCode::BAD_REQUEST, Json(detail)).into_response()
        }
    }
}

/// CORS for `allowed_origin`, plus the allow-headers header on responses
/// that are not preflights.
///
/// # Errors
///
/// Returns an error if `allowed_origin` is not a valid header value.
pub fn cors_layers(
    allowed_origin: &str,
) -> Result<(CorsLayer, SetResponseHeaderLayer<HeaderValue>), InvalidHeaderValue> {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_str(allowed_origin)?)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);
    let allow_headers = SetResponseHeaderLayer::if_not_present(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );
    Ok((cors, allow_headers))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
