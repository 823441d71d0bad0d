//! Per-connection session state and server-initiated request correlation
//!
//! A [`Session`] owns only a thin writer handle back into its transport, a
//! pending-request table, and an application scratch bag. Transports own the
//! sessions (via [`SessionManager`]); that keeps the ownership graph acyclic.
//!
//! `send_request` registers a one-shot result slot, writes the request
//! through the callback, and awaits the slot with a deadline. The pending
//! lock is never held across the await.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use rapidmcp_protocol::{Error, McpResult, RequestId, is_response};

/// Default deadline for server-initiated requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Non-blocking writer handle provided by the owning transport
pub type SendCallback = Arc<dyn Fn(&Value) -> McpResult<()> + Send + Sync>;

#[derive(Debug, Default, Clone)]
struct Capabilities {
    raw: Value,
    sampling: bool,
    sampling_tools: bool,
    elicitation: bool,
    roots: bool,
}

type PendingSlot = oneshot::Sender<McpResult<Value>>;

/// Bidirectional conversational state for one logical connection
pub struct Session {
    session_id: String,
    send: Mutex<Option<SendCallback>>,
    capabilities: Mutex<Capabilities>,
    pending: Mutex<HashMap<String, PendingSlot>>,
    request_counter: AtomicU64,
    state: Mutex<HashMap<String, Value>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl Session {
    /// Create a session with a writer handle
    pub fn new(session_id: impl Into<String>, send: SendCallback) -> Self {
        Self {
            session_id: session_id.into(),
            send: Mutex::new(Some(send)),
            capabilities: Mutex::new(Capabilities::default()),
            pending: Mutex::new(HashMap::new()),
            request_counter: AtomicU64::new(0),
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Create a session with no outbound channel yet
    ///
    /// Streamable HTTP sessions start detached; responses travel in the POST
    /// body and a writer can be attached later for server-push.
    pub fn detached(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            send: Mutex::new(None),
            capabilities: Mutex::new(Capabilities::default()),
            pending: Mutex::new(HashMap::new()),
            request_counter: AtomicU64::new(0),
            state: Mutex::new(HashMap::new()),
        }
    }

    /// The session id
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Attach or replace the writer handle
    pub fn set_send_callback(&self, send: SendCallback) {
        *self.send.lock() = Some(send);
    }

    // -----------------------------------------------------------------------
    // Client capabilities
    // -----------------------------------------------------------------------

    /// Record client capabilities from the `initialize` handshake
    ///
    /// Boolean support flags derive from the presence of the corresponding
    /// nested objects.
    pub fn set_capabilities(&self, capabilities: Value) {
        let mut caps = self.capabilities.lock();
        caps.sampling = capabilities.get("sampling").is_some_and(Value::is_object);
        caps.sampling_tools = capabilities
            .get("sampling")
            .and_then(|s| s.get("tools"))
            .is_some_and(Value::is_object);
        caps.elicitation = capabilities
            .get("elicitation")
            .is_some_and(Value::is_object);
        caps.roots = capabilities.get("roots").is_some_and(Value::is_object);
        caps.raw = capabilities;
    }

    /// Raw capabilities JSON as advertised by the client
    pub fn capabilities(&self) -> Value {
        self.capabilities.lock().raw.clone()
    }

    /// Whether the client supports `sampling/createMessage`
    pub fn supports_sampling(&self) -> bool {
        self.capabilities.lock().sampling
    }

    /// Whether the client supports tool use during sampling
    pub fn supports_sampling_tools(&self) -> bool {
        self.capabilities.lock().sampling_tools
    }

    /// Whether the client supports `elicitation/create`
    pub fn supports_elicitation(&self) -> bool {
        self.capabilities.lock().elicitation
    }

    /// Whether the client supports `roots/list`
    pub fn supports_roots(&self) -> bool {
        self.capabilities.lock().roots
    }

    // -----------------------------------------------------------------------
    // Request / response correlation
    // -----------------------------------------------------------------------

    /// Send a request to the client and await the matching response
    ///
    /// Mints an id of the form `srv_<n>`, registers a pending slot, writes
    /// through the transport callback, and waits up to `timeout`. The
    /// pending entry is removed whether or not the wait succeeded; a late
    /// response is silently dropped by [`Session::handle_response`].
    pub async fn send_request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> McpResult<Value> {
        let request_id = format!(
            "srv_{}",
            self.request_counter.fetch_add(1, Ordering::Relaxed) + 1
        );

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        let request = json!({
            "jsonrpc": "2.0",
            "id": request_id,
            "method": method,
            "params": params,
        });

        let send = self.send.lock().clone();
        if let Some(send) = send
            && let Err(e) = send(&request)
        {
            self.pending.lock().remove(&request_id);
            return Err(e);
        }
        trace!(session = %self.session_id, %request_id, method, "server request sent");

        let outcome = tokio::time::timeout(timeout, rx).await;
        self.pending.lock().remove(&request_id);

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_closed)) => Err(Error::internal("response slot dropped")),
            Err(_elapsed) => Err(Error::RequestTimeout {
                method: method.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Route an inbound response to its pending slot
    ///
    /// Returns `false` when the message is not a response or matches no
    /// pending request; late and duplicate deliveries land here and are
    /// dropped without effect.
    pub fn handle_response(&self, message: &Value) -> bool {
        if !is_response(message) {
            return false;
        }
        let Some(key) = message.get("id").and_then(RequestId::from_value) else {
            return false;
        };
        let Some(slot) = self.pending.lock().remove(&key.as_key()) else {
            trace!(session = %self.session_id, id = %key, "dropping response with no pending request");
            return false;
        };

        let outcome = if let Some(error) = message.get("error") {
            Err(Error::Client {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(-1),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
                data: error.get("data").cloned(),
            })
        } else {
            Ok(message.get("result").cloned().unwrap_or(Value::Null))
        };

        // A dropped receiver means the requester already timed out.
        if slot.send(outcome).is_err() {
            debug!(session = %self.session_id, id = %key, "response arrived after deadline");
        }
        true
    }

    /// Number of in-flight server-initiated requests
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    // -----------------------------------------------------------------------
    // Outbound messages
    // -----------------------------------------------------------------------

    /// Write a raw message through the transport callback
    pub fn send_raw(&self, message: &Value) -> McpResult<()> {
        let send = self.send.lock().clone();
        match send {
            Some(send) => send(message),
            None => {
                trace!(session = %self.session_id, "no outbound channel, message dropped");
                Ok(())
            }
        }
    }

    /// Send a fire-and-forget notification
    pub fn send_notification(&self, method: &str, params: Value) -> McpResult<()> {
        self.send_raw(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }))
    }

    // -----------------------------------------------------------------------
    // Server-initiated request conveniences
    // -----------------------------------------------------------------------

    /// Ask the client to run an LLM sampling request
    pub async fn create_message(&self, params: Value, timeout: Duration) -> McpResult<Value> {
        if !self.supports_sampling() {
            return Err(Error::validation("client does not support sampling"));
        }
        self.send_request("sampling/createMessage", params, timeout)
            .await
    }

    /// Ask the client to elicit input from the user
    pub async fn elicit(&self, params: Value, timeout: Duration) -> McpResult<Value> {
        if !self.supports_elicitation() {
            return Err(Error::validation("client does not support elicitation"));
        }
        self.send_request("elicitation/create", params, timeout).await
    }

    /// Ask the client for its filesystem roots
    pub async fn list_roots(&self, timeout: Duration) -> McpResult<Value> {
        if !self.supports_roots() {
            return Err(Error::validation("client does not support roots"));
        }
        self.send_request("roots/list", json!({}), timeout).await
    }

    // -----------------------------------------------------------------------
    // Application scratch state
    // -----------------------------------------------------------------------

    /// Read a value from the session state bag
    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.state.lock().get(key).cloned()
    }

    /// Store a value in the session state bag
    pub fn set_state(&self, key: impl Into<String>, value: Value) {
        self.state.lock().insert(key.into(), value);
    }

    /// Remove a value from the session state bag
    pub fn remove_state(&self, key: &str) -> Option<Value> {
        self.state.lock().remove(key)
    }
}

/// Shared table of live sessions, owned by the transports
#[derive(Debug)]
pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    max_sessions: usize,
}

impl SessionManager {
    /// Create a manager with a session cap
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_sessions,
        }
    }

    /// Mint a 128-bit random session id (32 lowercase hex chars)
    pub fn mint_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Whether the session cap is reached
    pub fn at_capacity(&self) -> bool {
        self.sessions.len() >= self.max_sessions
    }

    /// Insert a session under its id
    pub fn insert(&self, session: Arc<Session>) {
        self.sessions
            .insert(session.session_id().to_string(), session);
    }

    /// Look up a session by id
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| Arc::clone(&s))
    }

    /// Remove a session
    pub fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(session_id).map(|(_, s)| s)
    }

    /// Number of live sessions
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop all sessions
    pub fn clear(&self) {
        self.sessions.clear();
    }

    /// Send a notification to every live session
    pub fn broadcast(&self, method: &str, params: Value) {
        for entry in self.sessions.iter() {
            if let Err(e) = entry.value().send_notification(method, params.clone()) {
                warn!(session = %entry.key(), error = %e, "broadcast delivery failed");
            }
        }
    }
}
