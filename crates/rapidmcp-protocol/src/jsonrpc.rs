//! JSON-RPC 2.0 framing
//!
//! Wire-level message types plus the classification rules the session layer
//! relies on: a message is a request iff it carries both `id` and `method`,
//! a response iff it carries `id` but no `method`, and a notification iff it
//! carries `method` but no `id`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// JSON-RPC version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC version marker that validates on deserialization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "invalid JSON-RPC version: expected '{JSONRPC_VERSION}', got '{version}'"
            )))
        }
    }
}

/// Request identifier: string or integer
///
/// The original type is echoed back on responses; stringification via
/// [`RequestId::as_key`] is used only for internal correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String identifier
    String(String),
    /// Integer identifier
    Number(i64),
}

impl RequestId {
    /// Stringified form used as the pending-table key
    pub fn as_key(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Number(n) => n.to_string(),
        }
    }

    /// Extract an id from a raw message value, if it is a string or integer
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) => n.as_i64().map(Self::Number),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// JSON-RPC request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version marker
    pub jsonrpc: JsonRpcVersion,
    /// Request identifier
    pub id: RequestId,
    /// Method name
    pub method: String,
    /// Request parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a request
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC notification message (no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Protocol version marker
    pub jsonrpc: JsonRpcVersion,
    /// Method name
    pub method: String,
    /// Notification parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a notification
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i64,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Response payload: exactly one of `result` or `error`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponsePayload {
    /// Successful response
    Success {
        /// Result value
        result: Value,
    },
    /// Error response
    Error {
        /// Error object
        error: JsonRpcError,
    },
}

/// JSON-RPC response message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version marker
    pub jsonrpc: JsonRpcVersion,
    /// Echoed request identifier (`null` only for parse errors)
    pub id: Option<RequestId>,
    /// Response payload
    #[serde(flatten)]
    pub payload: JsonRpcResponsePayload,
}

impl JsonRpcResponse {
    /// Create a successful response
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: Some(id),
            payload: JsonRpcResponsePayload::Success { result },
        }
    }

    /// Create an error response
    pub fn error(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            payload: JsonRpcResponsePayload::Error { error },
        }
    }

    /// Result value, if this is a success response
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            JsonRpcResponsePayload::Success { result } => Some(result),
            JsonRpcResponsePayload::Error { .. } => None,
        }
    }

    /// Error object, if this is an error response
    pub fn error_object(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            JsonRpcResponsePayload::Success { .. } => None,
            JsonRpcResponsePayload::Error { error } => Some(error),
        }
    }
}

/// Standard JSON-RPC error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    /// Parse error (-32700)
    ParseError,
    /// Invalid request (-32600)
    InvalidRequest,
    /// Method not found (-32601)
    MethodNotFound,
    /// Invalid params (-32602)
    InvalidParams,
    /// Internal error (-32603)
    InternalError,
    /// Application-defined error
    ApplicationError(i64),
}

impl JsonRpcErrorCode {
    /// Numeric error code
    pub fn code(&self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ApplicationError(code) => *code,
        }
    }

    /// Standard error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ApplicationError(_) => "Application error",
        }
    }
}

impl From<JsonRpcErrorCode> for JsonRpcError {
    fn from(code: JsonRpcErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.message().to_string(),
            data: None,
        }
    }
}

/// True iff the raw message is a request (`id` and `method` both present)
pub fn is_request(message: &Value) -> bool {
    message.get("id").is_some() && message.get("method").is_some()
}

/// True iff the raw message is a response (`id` present, `method` absent)
pub fn is_response(message: &Value) -> bool {
    message.get("id").is_some() && message.get("method").is_none()
}

/// True iff the raw message is a notification (`method` present, `id` absent)
pub fn is_notification(message: &Value) -> bool {
    message.get("method").is_some() && message.get("id").is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn version_round_trip() {
        let json = serde_json::to_string(&JsonRpcVersion).unwrap();
        assert_eq!(json, "\"2.0\"");
        let parsed: Result<JsonRpcVersion, _> = serde_json::from_str("\"1.0\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn classification_rules() {
        let request = json!({"jsonrpc":"2.0","id":1,"method":"ping"});
        let response = json!({"jsonrpc":"2.0","id":1,"result":{}});
        let notification = json!({"jsonrpc":"2.0","method":"notifications/progress"});

        assert!(is_request(&request) && !is_response(&request) && !is_notification(&request));
        assert!(is_response(&response) && !is_request(&response) && !is_notification(&response));
        assert!(
            is_notification(&notification)
                && !is_request(&notification)
                && !is_response(&notification)
        );
    }

    #[test]
    fn request_id_echoes_original_type() {
        let numeric = json!({"jsonrpc":"2.0","id":42,"method":"ping"});
        let request: JsonRpcRequest = serde_json::from_value(numeric).unwrap();
        assert_eq!(request.id, RequestId::Number(42));
        assert_eq!(request.id.as_key(), "42");

        let echoed = serde_json::to_value(JsonRpcResponse::success(request.id, json!({}))).unwrap();
        assert_eq!(echoed["id"], json!(42));

        let string_id = RequestId::from("srv_1");
        assert_eq!(
            serde_json::to_value(&string_id).unwrap(),
            json!("srv_1")
        );
    }

    #[test]
    fn response_payload_is_exclusive() {
        let ok = JsonRpcResponse::success(RequestId::from(1), json!({"value": 5}));
        assert!(ok.result().is_some());
        assert!(ok.error_object().is_none());

        let err = JsonRpcResponse::error(
            Some(RequestId::from(1)),
            JsonRpcError::from(JsonRpcErrorCode::MethodNotFound),
        );
        assert!(err.result().is_none());
        assert_eq!(err.error_object().unwrap().code, -32601);

        let wire = serde_json::to_value(&err).unwrap();
        assert!(wire.get("result").is_none());
        assert_eq!(wire["error"]["code"], json!(-32601));
    }

    #[test]
    fn notification_has_no_id() {
        let n = JsonRpcNotification::new("notifications/tasks/status", Some(json!({"taskId":"t"})));
        let wire = serde_json::to_value(&n).unwrap();
        assert!(wire.get("id").is_none());
        assert!(is_notification(&wire));
    }
}
