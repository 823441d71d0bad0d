//! WebSocket client transport: one duplex channel, responses correlated by id

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use rapidmcp_protocol::{Error, McpResult, is_notification};

use crate::sse::NotificationHandler;
use crate::transport::{
    ClientTransport, PendingResponses, RequestIds, notification_envelope, request_envelope,
    unwrap_response,
};

/// WebSocket transport
pub struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<String>,
    pending: Arc<PendingResponses>,
    notifications: Arc<Mutex<Option<NotificationHandler>>>,
    ids: RequestIds,
    request_timeout: Duration,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport").finish()
    }
}

impl WebSocketTransport {
    /// Connect to a `ws://` or `wss://` URL
    pub async fn connect(url: &str) -> McpResult<Self> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| Error::transport(format!("WebSocket connect failed: {e}")))?;
        let (mut sink, mut stream) = socket.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    debug!(error = %e, "WebSocket write failed");
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
        });

        let pending = Arc::new(PendingResponses::default());
        let notifications: Arc<Mutex<Option<NotificationHandler>>> = Arc::new(Mutex::new(None));

        let reader = {
            let pending = Arc::clone(&pending);
            let notifications = Arc::clone(&notifications);
            tokio::spawn(async move {
                while let Some(next) = stream.next().await {
                    let message = match next {
                        Ok(Message::Text(text)) => text,
                        Ok(Message::Close(_)) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            debug!(error = %e, "WebSocket read failed");
                            break;
                        }
                    };
                    let Ok(value) = serde_json::from_str::<Value>(message.as_str()) else {
                        warn!("dropping non-JSON WebSocket frame");
                        continue;
                    };
                    if pending.resolve(&value) {
                        continue;
                    }
                    if is_notification(&value) {
                        let method = value
                            .get("method")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        let params = value.get("params").cloned().unwrap_or(Value::Null);
                        let callback = notifications.lock().clone();
                        if let Some(callback) = callback {
                            callback(method, params);
                        }
                    }
                }
                debug!("WebSocket stream ended");
            })
        };

        Ok(Self {
            outbound,
            pending,
            notifications,
            ids: RequestIds::default(),
            request_timeout: Duration::from_secs(30),
            reader,
            writer,
        })
    }

    /// Override the per-request response timeout (default 30 s)
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Register a callback for server notifications
    pub fn on_notification(&self, handler: NotificationHandler) {
        *self.notifications.lock() = Some(handler);
    }
}

#[async_trait]
impl ClientTransport for WebSocketTransport {
    async fn request(&self, method: &str, params: Value) -> McpResult<Value> {
        let id = self.ids.next();
        let receiver = self.pending.register(&id);
        let envelope = request_envelope(&id, method, params);

        if self.outbound.send(envelope.to_string()).is_err() {
            self.pending.forget(&id);
            return Err(Error::transport("WebSocket writer closed"));
        }

        match tokio::time::timeout(self.request_timeout, receiver).await {
            Ok(Ok(response)) => unwrap_response(&response),
            Ok(Err(_closed)) => Err(Error::transport("WebSocket transport closed")),
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
        let envelope = notification_envelope(method, params);
        self.outbound
            .send(envelope.to_string())
            .map_err(|_| Error::transport("WebSocket writer closed"))
    }

    async fn close(&self) -> McpResult<()> {
        self.reader.abort();
        self.writer.abort();
        Ok(())
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
