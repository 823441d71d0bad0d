//! Server transports: stdio, SSE, and streamable HTTP
//!
//! All transports share one logical contract: inbound messages are decoded,
//! classified, and delivered either to a session's `handle_response` (client
//! responses to server-initiated requests) or to the dispatcher; outbound
//! messages travel through the session's writer handle.

pub mod sse;
pub mod stdio;
pub mod streamable;

pub use sse::SseServer;
pub use stdio::StdioTransport;
pub use streamable::StreamableHttpServer;

use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use rapidmcp_protocol::types::meta;

/// Inject `_meta.session_id` into a request's params without overwriting an
/// existing value
pub(crate) fn inject_session_id(message: &mut Value, session_id: &str) {
    let Some(root) = message.as_object_mut() else {
        return;
    };
    let params = root
        .entry("params")
        .or_insert_with(|| json!({}));
    if !params.is_object() {
        *params = json!({});
    }
    let meta_entry = params
        .as_object_mut()
        .expect("params coerced to object above")
        .entry("_meta")
        .or_insert_with(|| json!({}));
    if !meta_entry.is_object() {
        *meta_entry = json!({});
    }
    let meta_map = meta_entry
        .as_object_mut()
        .expect("_meta coerced to object above");
    if !meta_map.contains_key(meta::SESSION_ID) {
        meta_map.insert(meta::SESSION_ID.to_string(), json!(session_id));
    }
}

/// Validate a bearer token header; an empty configured token allows everything
pub(crate) fn bearer_ok(headers: &HeaderMap, token: &str) -> bool {
    if token.is_empty() {
        return true;
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|provided| provided == token)
}

/// JSON-RPC parse-error response body (`-32700`)
pub(crate) fn parse_error_body(id: Option<Value>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": -32700, "message": "Parse error" },
    })
}

/// A JSON response with optional CORS origin header
pub(crate) fn json_response(status: StatusCode, body: Value, cors_origin: &str) -> Response {
    let mut response = (status, axum::Json(body)).into_response();
    apply_cors(&mut response, cors_origin);
    response
}

/// Attach the configured CORS origin, if any
pub(crate) fn apply_cors(response: &mut Response, cors_origin: &str) {
    if cors_origin.is_empty() {
        return;
    }
    if let Ok(value) = header::HeaderValue::from_str(cors_origin) {
        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
}

/// 405 with the correct `Allow` header and a JSON `{error, message}` body
pub(crate) fn method_not_allowed(allow: &str, message: &str, cors_origin: &str) -> Response {
    let mut response = (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, allow.to_string())],
        axum::Json(json!({
            "error": "Method Not Allowed",
            "message": message,
        })),
    )
        .into_response();
    apply_cors(&mut response, cors_origin);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn session_id_injection_creates_missing_layers() {
        let mut message = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
        inject_session_id(&mut message, "abc123");
        assert_eq!(message["params"]["_meta"]["session_id"], json!("abc123"));
    }

    #[test]
    fn session_id_injection_never_overwrites() {
        let mut message = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"_meta": {"session_id": "original"}},
        });
        inject_session_id(&mut message, "other");
        assert_eq!(message["params"]["_meta"]["session_id"], json!("original"));
    }

    #[test]
    fn bearer_validation() {
        let mut headers = HeaderMap::new();
        assert!(bearer_ok(&headers, ""));
        assert!(!bearer_ok(&headers, "secret"));

        headers.insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
        assert!(bearer_ok(&headers, "secret"));
        assert!(!bearer_ok(&headers, "other"));

        headers.insert(header::AUTHORIZATION, "Basic secret".parse().unwrap());
        assert!(!bearer_ok(&headers, "secret"));
    }
}
