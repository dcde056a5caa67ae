use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use std::fmt::Write;
use std::time::Instant;

use crate::api::error_response;

pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

/// Largest uncompressed request body accepted.
pub const MAX_REQUEST_BYTES: usize = 4 * 1024 * 1024;

const MAX_BODY_LOG_CHARS: usize = 200;

/// Per-request trace ID, stored in request extensions.
#[derive(Clone)]
pub struct TraceId(pub String);

fn generate_trace_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    bytes.iter().fold(String::with_capacity(16), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// First `max` bytes of a UTF-8 body, cut on a char boundary.
fn truncate_body(bytes: &[u8], max: usize) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if s.len() > max => {
            let mut end = max;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &s[..end])
        }
        Ok(s) => s.to_string(),
        Err(_) => "<non-utf8 body>".to_string(),
    }
}

fn format_elapsed(elapsed_us: u128) -> String {
    match elapsed_us {
        0..=999 => format!("{elapsed_us}µs"),
        1000..=999_999 => format!("{}ms", elapsed_us / 1000),
        _ => format!("{:.1}s", elapsed_us as f64 / 1_000_000.0),
    }
}

fn is_encoded(headers: &HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_ENCODING)
}

/// Logs each request and response under a fresh trace ID and returns the ID
/// in `X-Trace-Id`. Uncompressed POST bodies over [`MAX_REQUEST_BYTES`] are
/// refused with 413.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = generate_trace_id();
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    // Compressed bodies are left for the decompression layer
    let mut body_snippet = String::new();
    if method == "POST" && !is_encoded(req.headers()) {
        let (parts, body) = req.into_parts();
        let body_bytes = match axum::body::to_bytes(body, MAX_REQUEST_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    trace_id = %trace_id,
                    path = %path,
                    error = %e,
                    "Request body rejected"
                );
                return with_trace_id(
                    error_response(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        &trace_id,
                        "payload_too_large",
                        &format!("request body exceeds {MAX_REQUEST_BYTES} bytes"),
                    ),
                    &trace_id,
                );
            }
        };
        body_snippet = truncate_body(&body_bytes, MAX_BODY_LOG_CHARS);
        req = Request::from_parts(parts, Body::from(body_bytes));
    }

    tracing::info!(
        trace_id = %trace_id,
        method = %method,
        path = %path,
        user_agent = %user_agent,
        body = %body_snippet,
        "--> request"
    );

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = format_elapsed(start.elapsed().as_micros());
    let status = response.status();

    let (parts, body) = response.into_parts();
    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(trace_id = %trace_id, error = %e, "Failed to read response body");
            return with_trace_id(
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &trace_id,
                    "internal_error",
                    "failed to produce response",
                ),
                &trace_id,
            );
        }
    };

    let is_json = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    let snippet = if is_json && !is_encoded(&parts.headers) {
        truncate_body(&body_bytes, MAX_BODY_LOG_CHARS)
    } else {
        String::new()
    };

    let status_code = status.as_u16();
    if status.is_server_error() {
        tracing::error!(
            trace_id = %trace_id,
            status = status_code,
            elapsed = %elapsed,
            body = %snippet,
            "<-- response"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            trace_id = %trace_id,
            status = status_code,
            elapsed = %elapsed,
            body = %snippet,
            "<-- response"
        );
    } else {
        tracing::info!(
            trace_id = %trace_id,
            status = status_code,
            elapsed = %elapsed,
            bytes = body_bytes.len(),
            "<-- response"
        );
    }

    with_trace_id(Response::from_parts(parts, Body::from(body_bytes)), &trace_id)
}

fn with_trace_id(mut response: Response, trace_id: &str) -> Response {
    if let Ok(val) = HeaderValue::from_str(trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER, val);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_is_16_hex_chars() {
        let id = generate_trace_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        assert_eq!(truncate_body(b"short", 10), "short");
        assert_eq!(truncate_body("ééé".as_bytes(), 3), "é...");
        assert_eq!(truncate_body(&[0xff, 0xfe], 10), "<non-utf8 body>");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(250), "250µs");
        assert_eq!(format_elapsed(12_500), "12ms");
        assert_eq!(format_elapsed(2_500_000), "2.5s");
    }
}
