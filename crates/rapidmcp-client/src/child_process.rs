//! Subprocess stdio transport: spawn a server and speak line-delimited JSON

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, warn};

use rapidmcp_protocol::{Error, McpResult, is_notification};

use crate::sse::NotificationHandler;
use crate::transport::{
    ClientTransport, PendingResponses, RequestIds, notification_envelope, request_envelope,
    unwrap_response,
};

/// Subprocess stdio transport
pub struct ChildProcessTransport {
    child: Mutex<Option<Child>>,
    outbound: mpsc::UnboundedSender<String>,
    pending: Arc<PendingResponses>,
    notifications: Arc<Mutex<Option<NotificationHandler>>>,
    ids: RequestIds,
    request_timeout: Duration,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl std::fmt::Debug for ChildProcessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildProcessTransport").finish()
    }
}

impl ChildProcessTransport {
    /// Spawn `program` with `args`, wiring its stdin/stdout as the transport
    ///
    /// The child's stderr is inherited so its logs reach the parent's
    /// stderr; the process is killed when the transport drops.
    pub fn spawn<I, S>(program: &str, args: I) -> McpResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::transport(format!("failed to spawn '{program}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::transport("child stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::transport("child stdout unavailable"))?;

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            let mut sink = FramedWrite::new(stdin, LinesCodec::new());
            while let Some(line) = outbound_rx.recv().await {
                if let Err(e) = sink.send(line).await {
                    debug!(error = %e, "child stdin write failed");
                    break;
                }
            }
        });

        let pending = Arc::new(PendingResponses::default());
        let notifications: Arc<Mutex<Option<NotificationHandler>>> = Arc::new(Mutex::new(None));

        let reader = {
            let pending = Arc::clone(&pending);
            let notifications = Arc::clone(&notifications);
            tokio::spawn(async move {
                let mut lines = FramedRead::new(stdout, LinesCodec::new());
                while let Some(line) = lines.next().await {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            debug!(error = %e, "child stdout read failed");
                            break;
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let Ok(value) = serde_json::from_str::<Value>(&line) else {
                        warn!("dropping non-JSON line from child");
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
                debug!("child stdout closed");
            })
        };

        Ok(Self {
            child: Mutex::new(Some(child)),
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
impl ClientTransport for ChildProcessTransport {
    async fn request(&self, method: &str, params: Value) -> McpResult<Value> {
        let id = self.ids.next();
        let receiver = self.pending.register(&id);
        let envelope = request_envelope(&id, method, params);

        if self.outbound.send(envelope.to_string()).is_err() {
            self.pending.forget(&id);
            return Err(Error::transport("child stdin closed"));
        }

        match tokio::time::timeout(self.request_timeout, receiver).await {
            Ok(Ok(response)) => unwrap_response(&response),
            Ok(Err(_closed)) => Err(Error::transport("child process transport closed")),
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
        self.outbound
            .send(notification_envelope(method, params).to_string())
            .map_err(|_| Error::transport("child stdin closed"))
    }

    async fn close(&self) -> McpResult<()> {
        self.reader.abort();
        self.writer.abort();
        if let Some(mut child) = self.child.lock().take() {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "child kill failed");
            }
        }
        Ok(())
    }
}

impl Drop for ChildProcessTransport {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
