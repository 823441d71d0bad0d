//! SSE client transport
//!
//! Opens the event stream with a GET, learns the message endpoint (and the
//! session id embedded in it) from the first `endpoint` event, and POSTs
//! requests there. Responses are correlated by id from whichever delivery
//! path lands first (the stream or the POST body). Server-initiated
//! requests arriving on the stream are dispatched to registered handlers
//! and their results POSTed back with the request's id.

use async_trait::async_trait;
use futures::StreamExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use rapidmcp_protocol::{Error, McpResult, is_notification, is_request};

use crate::codec::SseParser;
use crate::transport::{
    ClientTransport, PendingResponses, RequestIds, notification_envelope, request_envelope,
    unwrap_response,
};

/// Handler for server-initiated requests (sampling, elicitation, roots)
pub type ServerRequestHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, McpResult<Value>> + Send + Sync>;

/// Callback for notifications pushed by the server
pub type NotificationHandler = Arc<dyn Fn(String, Value) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    requests: HashMap<String, ServerRequestHandler>,
    notifications: Option<NotificationHandler>,
}

/// SSE client transport
pub struct SseTransport {
    client: reqwest::Client,
    base_url: String,
    endpoint: watch::Receiver<Option<String>>,
    pending: Arc<PendingResponses>,
    handlers: Arc<Mutex<Handlers>>,
    ids: RequestIds,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl std::fmt::Debug for SseTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseTransport")
            .field("base_url", &self.base_url)
            .field("endpoint", &*self.endpoint.borrow())
            .finish()
    }
}

impl SseTransport {
    /// Connect to `base_url` (e.g. `http://127.0.0.1:8080`) on the given SSE path
    ///
    /// Resolves once the server's `endpoint` event has been received.
    pub async fn connect(base_url: impl Into<String>, sse_path: &str) -> McpResult<Self> {
        let base_url = base_url.into();
        let client = reqwest::Client::new();

        let response = client
            .get(format!("{base_url}{sse_path}"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| Error::transport(format!("SSE connect failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::transport(format!(
                "SSE connect failed: HTTP {}",
                response.status()
            )));
        }

        let (endpoint_tx, mut endpoint_rx) = watch::channel(None::<String>);
        let pending = Arc::new(PendingResponses::default());
        let handlers = Arc::new(Mutex::new(Handlers::default()));

        let reader = tokio::spawn(read_stream(
            response,
            endpoint_tx,
            Arc::clone(&pending),
            Arc::clone(&handlers),
            client.clone(),
            base_url.clone(),
        ));

        // The first endpoint event is the handshake; without it there is
        // nowhere to POST.
        let learned = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if endpoint_rx.borrow().is_some() {
                    return true;
                }
                if endpoint_rx.changed().await.is_err() {
                    return false;
                }
            }
        })
        .await;
        match learned {
            Ok(true) => {}
            Ok(false) => return Err(Error::transport("SSE stream closed before endpoint event")),
            Err(_) => return Err(Error::transport("timed out waiting for endpoint event")),
        }

        Ok(Self {
            client,
            base_url,
            endpoint: endpoint_rx,
            pending,
            handlers,
            ids: RequestIds::default(),
            request_timeout: Duration::from_secs(30),
            reader,
        })
    }

    /// Override the per-request response timeout (default 30 s)
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Register a handler for a server-initiated method
    /// (e.g. `sampling/createMessage`, `elicitation/create`, `roots/list`)
    pub fn on_server_request(&self, method: impl Into<String>, handler: ServerRequestHandler) {
        self.handlers.lock().requests.insert(method.into(), handler);
    }

    /// Register a callback for server notifications
    pub fn on_notification(&self, handler: NotificationHandler) {
        self.handlers.lock().notifications = Some(handler);
    }

    /// The session id learned from the endpoint event
    pub fn session_id(&self) -> Option<String> {
        self.endpoint
            .borrow()
            .as_deref()
            .and_then(extract_session_id)
    }

    fn message_url(&self) -> McpResult<String> {
        let endpoint = self
            .endpoint
            .borrow()
            .clone()
            .ok_or_else(|| Error::transport("no message endpoint learned"))?;
        Ok(format!("{}{endpoint}", self.base_url))
    }
}

#[async_trait]
impl ClientTransport for SseTransport {
    async fn request(&self, method: &str, params: Value) -> McpResult<Value> {
        let id = self.ids.next();
        let receiver = self.pending.register(&id);
        let envelope = request_envelope(&id, method, params);
        let url = self.message_url()?;

        let posted = self.client.post(&url).json(&envelope).send().await;
        let response = match posted {
            Ok(response) => response,
            Err(e) => {
                self.pending.forget(&id);
                return Err(Error::transport(format!("POST failed: {e}")));
            }
        };

        // The POST body duplicates the stream delivery; feed it through the
        // same correlation path so whichever arrives first wins.
        if let Ok(body) = response.json::<Value>().await {
            self.pending.resolve(&body);
        }

        match tokio::time::timeout(self.request_timeout, receiver).await {
            Ok(Ok(response)) => unwrap_response(&response),
            Ok(Err(_closed)) => Err(Error::transport("SSE transport closed")),
            Err(_) => {
                self.pending.forget(&id);
                Err(Error::RequestTimeout {
                    method: method.to_string(),
                    timeout_ms: self.request_timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn notify(&self, method: &str, params: Value) -> McpResult<()> {
        let url = self.message_url()?;
        self.client
            .post(&url)
            .json(&notification_envelope(method, params))
            .send()
            .await
            .map_err(|e| Error::transport(format!("POST failed: {e}")))?;
        Ok(())
    }

    async fn close(&self) -> McpResult<()> {
        self.reader.abort();
        Ok(())
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_stream(
    response: reqwest::Response,
    endpoint_tx: watch::Sender<Option<String>>,
    pending: Arc<PendingResponses>,
    handlers: Arc<Mutex<Handlers>>,
    client: reqwest::Client,
    base_url: String,
) {
    let mut parser = SseParser::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, "SSE stream read failed");
                break;
            }
        };
        let text = String::from_utf8_lossy(&chunk);
        for event in parser.push(&text) {
            match event.event.as_deref() {
                Some("endpoint") => {
                    trace!(endpoint = %event.data, "message endpoint learned");
                    let _ = endpoint_tx.send(Some(event.data.clone()));
                }
                Some("heartbeat") => {}
                _ => {
                    let Ok(message) = serde_json::from_str::<Value>(&event.data) else {
                        continue;
                    };
                    route_stream_message(message, &pending, &handlers, &client, &base_url, &endpoint_tx);
                }
            }
        }
    }
    debug!("SSE stream ended");
}

fn route_stream_message(
    message: Value,
    pending: &Arc<PendingResponses>,
    handlers: &Arc<Mutex<Handlers>>,
    client: &reqwest::Client,
    base_url: &str,
    endpoint_tx: &watch::Sender<Option<String>>,
) {
    if pending.resolve(&message) {
        return;
    }

    if is_request(&message) {
        let method = message
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let handler = handlers.lock().requests.get(&method).cloned();
        let Some(handler) = handler else {
            debug!(method = %method, "server request with no registered handler");
            return;
        };

        let id = message.get("id").cloned().unwrap_or(Value::Null);
        let params = message.get("params").cloned().unwrap_or_else(|| json!({}));
        let endpoint = endpoint_tx.borrow().clone();
        let client = client.clone();
        let base_url = base_url.to_string();

        tokio::spawn(async move {
            let reply = match handler(params).await {
                Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                Err(e) => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": e.jsonrpc_code(), "message": e.to_string()},
                }),
            };
            let Some(endpoint) = endpoint else {
                warn!("server request reply dropped: no endpoint");
                return;
            };
            let url = format!("{base_url}{endpoint}");
            if let Err(e) = client.post(&url).json(&reply).send().await {
                warn!(error = %e, "server request reply POST failed");
            }
        });
        return;
    }

    if is_notification(&message) {
        let method = message
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let params = message.get("params").cloned().unwrap_or(Value::Null);
        let callback = handlers.lock().notifications.clone();
        if let Some(callback) = callback {
            callback(method, params);
        }
    }
}

fn extract_session_id(endpoint: &str) -> Option<String> {
    let (_, query) = endpoint.split_once('?')?;
    query.split('&').find_map(|pair| {
        pair.strip_prefix("session_id=")
            .map(|session_id| session_id.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn session_id_extraction() {
        assert_eq!(
            extract_session_id("/messages?session_id=deadbeef"),
            Some("deadbeef".to_string())
        );
        assert_eq!(
            extract_session_id("/messages?a=1&session_id=ff00"),
            Some("ff00".to_string())
        );
        assert_eq!(extract_session_id("/messages"), None);
    }
}
