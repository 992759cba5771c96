//! JSON input sanitization.
//!
//! Every string in the body of a JSON `POST`/`PUT` is passed through a
//! strip-everything HTML policy before the handler sees it. Non-JSON
//! requests (notably multipart uploads) pass through untouched.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::Value;

use crate::MAX_BODY_BYTES;
use crate::error::error_response;

pub async fn json_bodies(req: Request, next: Next) -> Response {
    let mutating = req.method() == Method::POST || req.method() == Method::PUT;
    let is_json = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("application/json"));
    if !mutating || !is_json {
        return next.run(req).await;
    }

    let (mut parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "cannot read request body"),
    };
    let mut value: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "malformed JSON body"),
    };

    sanitize_value(&mut value);
    let sanitized = match serde_json::to_vec(&value) {
        Ok(sanitized) => sanitized,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "cannot re-encode body"),
    };
    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(sanitized.len()));
    next.run(Request::from_parts(parts, Body::from(sanitized))).await
}

fn sanitize_value(value: &mut Value) {
    match value {
        Value::String(s) => *s = strip_html(s),
        Value::Array(items) => items.iter_mut().for_each(sanitize_value),
        Value::Object(map) => map.values_mut().for_each(sanitize_value),
        _ => {}
    }
}

/// Strip every HTML element; script and style contents disappear entirely.
fn strip_html(input: &str) -> String {
    ammonia::Builder::empty().clean(input).to_string()
}
