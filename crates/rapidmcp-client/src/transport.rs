//! Client transport contract and shared correlation plumbing

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::trace;

use rapidmcp_protocol::{Error, McpResult, is_response};

/// Callback receiving streamed events
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// A client-side MCP transport
///
/// `request` performs one JSON-RPC call and resolves to the peer's `result`
/// value; error responses surface as [`Error::Client`]. `request_stream`
/// additionally delivers intermediate events for transports that support
/// chunked delivery; the default falls back to a unary request.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Send a request and await its result
    async fn request(&self, method: &str, params: Value) -> McpResult<Value>;

    /// Send a fire-and-forget notification
    async fn notify(&self, method: &str, params: Value) -> McpResult<()>;

    /// Send a request, delivering intermediate events to `on_event`
    async fn request_stream(
        &self,
        method: &str,
        params: Value,
        on_event: EventHandler,
    ) -> McpResult<Value> {
        let result = self.request(method, params).await?;
        on_event(result.clone());
        Ok(result)
    }

    /// Shut the transport down; idempotent
    async fn close(&self) -> McpResult<()> {
        Ok(())
    }
}

/// Monotonic request-id source (`cli_<n>`)
#[derive(Debug, Default)]
pub(crate) struct RequestIds {
    counter: AtomicU64,
}

impl RequestIds {
    pub(crate) fn next(&self) -> String {
        format!("cli_{}", self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Pending-response table keyed by stringified request id
#[derive(Debug, Default)]
pub(crate) struct PendingResponses {
    slots: Mutex<HashMap<String, oneshot::Sender<Value>>>,
}

impl PendingResponses {
    /// Register a slot for a request id
    pub(crate) fn register(&self, id: &str) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(id.to_string(), tx);
        rx
    }

    /// Remove a slot after a timeout
    pub(crate) fn forget(&self, id: &str) {
        self.slots.lock().remove(id);
    }

    /// Deliver a response message into its slot; duplicates are dropped
    pub(crate) fn resolve(&self, message: &Value) -> bool {
        if !is_response(message) {
            return false;
        }
        let key = match message.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return false,
        };
        let Some(slot) = self.slots.lock().remove(&key) else {
            trace!(id = %key, "response with no pending request dropped");
            return false;
        };
        slot.send(message.clone()).is_ok()
    }
}

/// Build a JSON-RPC request envelope
pub(crate) fn request_envelope(id: &str, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Build a JSON-RPC notification envelope
pub(crate) fn notification_envelope(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    })
}

/// Unwrap a JSON-RPC response into its result, mapping errors
pub(crate) fn unwrap_response(response: &Value) -> McpResult<Value> {
    if let Some(error) = response.get("error") {
        return Err(Error::Client {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(-1),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
            data: error.get("data").cloned(),
        });
    }
    Ok(response.get("result").cloned().unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ids_are_monotonic() {
        let ids = RequestIds::default();
        assert_eq!(ids.next(), "cli_1");
        assert_eq!(ids.next(), "cli_2");
    }

    #[tokio::test]
    async fn pending_resolution_and_duplicates() {
        let pending = PendingResponses::default();
        let rx = pending.register("cli_1");

        let response = json!({"jsonrpc": "2.0", "id": "cli_1", "result": {"ok": true}});
        assert!(pending.resolve(&response));
        // Second delivery finds no slot.
        assert!(!pending.resolve(&response));

        let delivered = rx.await.unwrap();
        assert_eq!(unwrap_response(&delivered).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn error_responses_unwrap_to_client_errors() {
        let response = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "Method not found"},
        });
        let err = unwrap_response(&response).unwrap_err();
        match err {
            Error::Client { code, .. } => assert_eq!(code, -32601),
            other => panic!("unexpected error: {other}"),
        }
    }
}
