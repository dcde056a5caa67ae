use crate::logging::TraceId;
use crate::service::ServiceError;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Extension, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use gaugemon_common::types::MetricRecord;
use serde::Serialize;
use std::fmt::Write;

/// JSON error envelope.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "not_found" => 1004,
        "invalid_type" => 1010,
        "invalid_value" => 1011,
        "hash_mismatch" => 1012,
        "payload_too_large" => 1013,
        "storage_error" => 1501,
        "internal_error" => 1500,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiError {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
        }),
    )
        .into_response()
}

fn service_error_response(trace_id: &str, err: ServiceError) -> Response {
    let (status, code) = match &err {
        ServiceError::InvalidType(_) => (StatusCode::BAD_REQUEST, "invalid_type"),
        ServiceError::MissingValue { .. }
        | ServiceError::InvalidValue { .. }
        | ServiceError::EmptyName => (StatusCode::BAD_REQUEST, "invalid_value"),
        ServiceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        ServiceError::Storage(e) => {
            tracing::error!(trace_id = %trace_id, error = %e, "Storage failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
        }
    };
    error_response(status, trace_id, code, &err.to_string())
}

fn parse_json<T: serde::de::DeserializeOwned>(trace_id: &str, body: &[u8]) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            trace_id,
            "bad_request",
            &format!("invalid JSON body: {e}"),
        )
    })
}

fn plain_text(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_metrics))
        .route("/ping", get(ping))
        .route("/update", post(update_json))
        .route("/update/", post(update_json))
        .route("/update/{mtype}/{name}/{value}", post(update_path))
        .route("/updates/", post(update_batch))
        .route("/value", post(value_json))
        .route("/value/", post(value_json))
        .route("/value/{mtype}/{name}", get(value_path))
}

async fn update_path(
    Extension(TraceId(trace_id)): Extension<TraceId>,
    State(state): State<AppState>,
    Path((mtype, name, value)): Path<(String, String, String)>,
) -> Response {
    match state.service.push_raw(&mtype, &name, &value).await {
        Ok(()) => plain_text(String::new()),
        Err(e) => service_error_response(&trace_id, e),
    }
}

/// Applies one record and echoes it back.
async fn update_json(
    Extension(TraceId(trace_id)): Extension<TraceId>,
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let record: MetricRecord = match parse_json(&trace_id, &body) {
        Ok(record) => record,
        Err(resp) => return resp,
    };
    match state.service.push(&record).await {
        Ok(()) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => service_error_response(&trace_id, e),
    }
}

async fn update_batch(
    Extension(TraceId(trace_id)): Extension<TraceId>,
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let records: Vec<MetricRecord> = match parse_json(&trace_id, &body) {
        Ok(records) => records,
        Err(resp) => return resp,
    };
    match state.service.push_batch(&records).await {
        Ok(()) => {
            tracing::debug!(trace_id = %trace_id, count = records.len(), "Applied metric batch");
            StatusCode::OK.into_response()
        }
        Err(e) => service_error_response(&trace_id, e),
    }
}

async fn value_path(
    Extension(TraceId(trace_id)): Extension<TraceId>,
    State(state): State<AppState>,
    Path((mtype, name)): Path<(String, String)>,
) -> Response {
    match state.service.get_raw(&mtype, &name).await {
        Ok(text) => plain_text(text),
        Err(e) => service_error_response(&trace_id, e),
    }
}

async fn value_json(
    Extension(TraceId(trace_id)): Extension<TraceId>,
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let query: MetricRecord = match parse_json(&trace_id, &body) {
        Ok(query) => query,
        Err(resp) => return resp,
    };
    match state.service.lookup(query).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => service_error_response(&trace_id, e),
    }
}

async fn ping(
    Extension(TraceId(trace_id)): Extension<TraceId>,
    State(state): State<AppState>,
) -> Response {
    match state.service.ping().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => service_error_response(&trace_id, e),
    }
}

/// HTML table of every metric: gauges to two decimals, counters as integers.
async fn list_metrics(
    Extension(TraceId(trace_id)): Extension<TraceId>,
    State(state): State<AppState>,
) -> Response {
    let gauges = match state.service.get_all_gauges().await {
        Ok(gauges) => gauges,
        Err(e) => return service_error_response(&trace_id, e),
    };
    let counters = match state.service.get_all_counters().await {
        Ok(counters) => counters,
        Err(e) => return service_error_response(&trace_id, e),
    };

    let mut page = String::from(
        "<!DOCTYPE html>\n<html>\n<head><title>Metrics</title></head>\n<body>\n\
         <table>\n<tr><th>Name</th><th>Type</th><th>Value</th></tr>\n",
    );
    for g in &gauges {
        let _ = writeln!(
            page,
            "<tr><td>{}</td><td>gauge</td><td>{:.2}</td></tr>",
            escape_html(&g.name),
            g.value
        );
    }
    for c in &counters {
        let _ = writeln!(
            page,
            "<tr><td>{}</td><td>counter</td><td>{}</td></tr>",
            escape_html(&c.name),
            c.value
        );
    }
    page.push_str("</table>\n</body>\n</html>\n");
    Html(page).into_response()
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>&'x'\""), "&lt;b&gt;&amp;&#39;x&#39;&quot;");
        assert_eq!(escape_html("Alloc"), "Alloc");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(to_custom_error_code("not_found"), 1004);
        assert_eq!(to_custom_error_code("storage_error"), 1501);
        assert_eq!(to_custom_error_code("something_else"), 1999);
    }
}
