//! Stdio transport: newline-delimited JSON over stdin/stdout
//!
//! One process, one peer, one session with the fixed id `stdio`. Each line
//! is one complete message. Responses produced by the dispatcher and
//! server-initiated messages share a single writer task, so output lines
//! never interleave. All logging goes to stderr via `tracing`; stdout is the
//! wire. Returns on EOF.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, trace};

use rapidmcp_protocol::{Error, McpResult, is_response};

use crate::dispatcher::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::session::{SendCallback, Session, SessionManager};
use crate::transport::{inject_session_id, parse_error_body};

/// Fixed session id for the stdio peer
pub const STDIO_SESSION_ID: &str = "stdio";

/// Stdio server transport
#[derive(Debug)]
pub struct StdioTransport {
    dispatcher: Arc<Dispatcher>,
    sessions: Arc<SessionManager>,
}

impl StdioTransport {
    /// Create a stdio transport over a dispatcher
    pub fn new(dispatcher: Arc<Dispatcher>, sessions: Arc<SessionManager>) -> Self {
        Self {
            dispatcher,
            sessions,
        }
    }

    /// Serve stdin/stdout until EOF
    pub async fn run(&self) -> ServerResult<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut reader = FramedRead::new(stdin, LinesCodec::new());

        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let writer_task = tokio::spawn(async move {
            let mut writer = FramedWrite::new(tokio::io::stdout(), LinesCodec::new());
            while let Some(message) = rx.recv().await {
                // serde escapes control characters, so the line is newline-free.
                let line = message.to_string();
                if let Err(e) = writer.send(line).await {
                    error!(error = %e, "stdout write failed");
                    break;
                }
            }
        });

        let sender = tx.clone();
        let callback: SendCallback = Arc::new(move |message: &Value| {
            sender
                .send(message.clone())
                .map_err(|_| Error::transport("stdout writer gone"))
        });
        let session = Arc::new(Session::new(STDIO_SESSION_ID, callback));
        self.sessions.insert(Arc::clone(&session));

        debug!("stdio transport started");
        while let Some(line) = reader.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!(error = %e, "stdin read failed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let message: Value = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(e) => {
                    debug!(error = %e, "bad JSON on stdin");
                    let _ = tx.send(parse_error_body(None));
                    continue;
                }
            };

            if is_response(&message) {
                if !session.handle_response(&message) {
                    trace!("response with no pending request dropped");
                }
                continue;
            }

            // Dispatch concurrently so a handler awaiting a client response
            // does not block the read loop that must deliver it.
            let dispatcher = Arc::clone(&self.dispatcher);
            let session = Arc::clone(&session);
            let out = tx.clone();
            tokio::spawn(async move {
                if let Some(response) = dispatch_line(&dispatcher, &session, message).await {
                    let _ = out.send(response);
                }
            });
        }

        debug!("stdin closed, stdio transport stopping");
        self.sessions.remove(STDIO_SESSION_ID);
        drop(tx);
        writer_task
            .await
            .map_err(|e| ServerError::transport(format!("writer task failed: {e}")))?;
        Ok(())
    }
}

/// Inject the stdio session id and route one decoded message
async fn dispatch_line(
    dispatcher: &Dispatcher,
    session: &Arc<Session>,
    mut message: Value,
) -> Option<Value> {
    inject_session_id(&mut message, session.session_id());
    dispatcher.dispatch(message).await
}

/// Serialize an outbound message as a single stdio line
///
/// Rejects payloads that would break newline framing; compact JSON encoding
/// never produces raw newlines, so this only fires for hand-built strings.
pub fn encode_line(message: &Value) -> McpResult<String> {
    let line = message.to_string();
    if line.contains('\n') || line.contains('\r') {
        return Err(Error::transport("message contains embedded newlines"));
    }
    Ok(line)
}
