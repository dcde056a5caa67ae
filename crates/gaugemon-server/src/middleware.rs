use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use gaugemon_common::hasher::{Hasher, HASH_HEADER};
use std::sync::Arc;

use crate::api::error_response;
use crate::logging::{TraceId, MAX_REQUEST_BYTES};

/// Verifies `HashSHA256` on requests that carry it and signs their
/// responses.
///
/// The digest covers the body as it travels on the wire, so this layer sits
/// outside request decompression. Requests without the header pass through
/// untouched.
pub async fn hash_middleware(
    State(hasher): State<Arc<Hasher>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(signature) = req
        .headers()
        .get(HASH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
    else {
        return next.run(req).await;
    };

    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let (parts, body) = req.into_parts();
    let body_bytes = match to_bytes(body, MAX_REQUEST_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(trace_id = %trace_id, error = %e, "Signed request body rejected");
            return error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                &trace_id,
                "payload_too_large",
                &format!("request body exceeds {MAX_REQUEST_BYTES} bytes"),
            );
        }
    };

    match hasher.validate(&body_bytes, &signature) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(trace_id = %trace_id, "Request rejected: hash mismatch");
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "hash_mismatch",
                "request hash does not match body",
            );
        }
        Err(e) => {
            tracing::warn!(trace_id = %trace_id, error = %e, "Request rejected: malformed hash");
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "bad_request",
                &e.to_string(),
            );
        }
    }

    let response = next
        .run(Request::from_parts(parts, Body::from(body_bytes)))
        .await;
    sign_response(&hasher, response, &trace_id).await
}

async fn sign_response(hasher: &Hasher, response: Response, trace_id: &str) -> Response {
    let (mut parts, body) = response.into_parts();
    let body_bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(
                trace_id = %trace_id,
                error = %e,
                "Failed to buffer response for signing"
            );
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                trace_id,
                "internal_error",
                "failed to sign response",
            );
        }
    };
    if let Ok(val) = HeaderValue::from_str(&hasher.hash(&body_bytes)) {
        parts.headers.insert(HASH_HEADER, val);
    }
    Response::from_parts(parts, Body::from(body_bytes))
}
