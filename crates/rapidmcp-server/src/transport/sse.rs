//! SSE transport: GET event stream paired with a POST ingress endpoint
//!
//! A GET on the stream path mints a session id and opens a one-way
//! server-push channel; the client echoes the id in the
//! `?session_id=` query of every POST to the message path. Each connection
//! owns a bounded fan-out queue; producers enqueue without blocking and the
//! stream task drains. Overflow or a failed write marks the connection dead
//! and ends the stream, while the session itself stays registered.
//!
//! Dispatcher replies are delivered both over the SSE stream and in the
//! POST body; clients are expected to tolerate the duplicate.

use axum::Router;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, error, info, trace, warn};

use rapidmcp_protocol::{Error, is_response};

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::session::{SendCallback, Session, SessionManager};
use crate::transport::{
    bearer_ok, inject_session_id, json_response, method_not_allowed, parse_error_body,
};

#[derive(Clone)]
struct SseState {
    dispatcher: Arc<Dispatcher>,
    sessions: Arc<SessionManager>,
    config: Arc<ServerConfig>,
    active_streams: Arc<AtomicUsize>,
}

/// SSE server with paired GET stream / POST ingress endpoints
pub struct SseServer {
    state: SseState,
    serve_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl std::fmt::Debug for SseServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseServer")
            .field("addr", &*self.local_addr.lock())
            .field("streams", &self.state.active_streams.load(Ordering::Relaxed))
            .finish()
    }
}

impl SseServer {
    /// Create a server over a dispatcher and session table
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        sessions: Arc<SessionManager>,
        config: ServerConfig,
    ) -> Self {
        Self {
            state: SseState {
                dispatcher,
                sessions,
                config: Arc::new(config),
                active_streams: Arc::new(AtomicUsize::new(0)),
            },
            serve_task: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// The axum router for this server
    pub fn router(&self) -> Router {
        let config = &self.state.config;
        Router::new()
            .route(&config.sse_path, get(sse_get).post(sse_post_rejected))
            .route(
                &config.message_path,
                post(message_post).get(message_get_rejected),
            )
            .layer(DefaultBodyLimit::max(config.max_payload_bytes))
            .layer(TimeoutLayer::new(config.read_timeout))
            .with_state(self.state.clone())
    }

    /// Bind and serve in the background; returns the bound address
    pub async fn start(&self) -> ServerResult<SocketAddr> {
        if self.serve_task.lock().is_some() {
            return Err(ServerError::lifecycle("server already started"));
        }
        let listener = tokio::net::TcpListener::bind(self.state.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        *self.local_addr.lock() = Some(addr);

        let app = self.router();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "SSE server error");
            }
        });
        *self.serve_task.lock() = Some(task);
        info!(%addr, "SSE server listening");
        Ok(addr)
    }

    /// The bound address, when started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Number of open event streams
    pub fn connection_count(&self) -> usize {
        self.state.active_streams.load(Ordering::Relaxed)
    }

    /// Session lookup for server-initiated requests
    pub fn get_session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.state.sessions.get(session_id)
    }

    /// Stop serving and drop all sessions; idempotent
    pub fn stop(&self) {
        if let Some(task) = self.serve_task.lock().take() {
            task.abort();
            debug!("SSE server stopped");
        }
        self.state.sessions.clear();
        *self.local_addr.lock() = None;
    }
}

impl Drop for SseServer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct StreamGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

async fn sse_get(State(state): State<SseState>, headers: HeaderMap) -> Response {
    let config = &state.config;
    let cors = config.cors_origin.as_str();

    if !bearer_ok(&headers, &config.auth_token) {
        return json_response(StatusCode::UNAUTHORIZED, json!({"error": "Unauthorized"}), cors);
    }
    if state.active_streams.load(Ordering::Relaxed) >= config.max_sse_connections {
        return json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"error": "Maximum connections reached"}),
            cors,
        );
    }

    let session_id = SessionManager::mint_id();
    let (tx, mut rx) = mpsc::channel::<Value>(config.max_queue_size);
    let dead = Arc::new(AtomicBool::new(false));

    let callback: SendCallback = {
        let dead = Arc::clone(&dead);
        let session_id = session_id.clone();
        Arc::new(move |message: &Value| {
            if dead.load(Ordering::Relaxed) {
                return Err(Error::transport("SSE connection dead"));
            }
            match tx.try_send(message.clone()) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(session = %session_id, "SSE queue overflow, marking connection dead");
                    dead.store(true, Ordering::Relaxed);
                    Err(Error::transport("SSE queue overflow"))
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.store(true, Ordering::Relaxed);
                    Err(Error::transport("SSE stream closed"))
                }
            }
        })
    };

    state
        .sessions
        .insert(Arc::new(Session::new(session_id.clone(), callback)));
    state.active_streams.fetch_add(1, Ordering::Relaxed);
    info!(session = %session_id, "SSE connection established");

    let guard = StreamGuard {
        active: Arc::clone(&state.active_streams),
    };
    let endpoint = format!("{}?session_id={}", config.message_path, session_id);
    let heartbeat_interval = config.heartbeat_interval;

    let stream = async_stream::stream! {
        let _guard = guard;

        // The endpoint event is the handshake: it tells the client where to
        // POST and which session id to echo.
        yield Ok::<Event, std::convert::Infallible>(
            Event::default().event("endpoint").data(endpoint),
        );

        let mut heartbeats: u64 = 0;
        let start = tokio::time::Instant::now() + heartbeat_interval;
        let mut ticker = tokio::time::interval_at(start, heartbeat_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if dead.load(Ordering::Relaxed) {
                break;
            }
            tokio::select! {
                received = rx.recv() => match received {
                    Some(message) => {
                        trace!(session = %session_id, "SSE event delivered");
                        yield Ok(Event::default().data(message.to_string()));
                        ticker.reset();
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    heartbeats += 1;
                    yield Ok(Event::default().event("heartbeat").data(heartbeats.to_string()));
                }
            }
        }
        debug!(session = %session_id, "SSE stream closed");
    };

    let mut response = Sse::new(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream; charset=utf-8"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    if !cors.is_empty()
        && let Ok(origin) = HeaderValue::from_str(cors)
    {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    response
}

async fn sse_post_rejected(State(state): State<SseState>) -> Response {
    method_not_allowed(
        "GET",
        "The SSE endpoint only supports GET requests. Use POST on the message endpoint.",
        &state.config.cors_origin,
    )
}

async fn message_get_rejected(State(state): State<SseState>) -> Response {
    method_not_allowed(
        "POST",
        "The message endpoint only supports POST requests.",
        &state.config.cors_origin,
    )
}

async fn message_post(
    State(state): State<SseState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let config = &state.config;
    let cors = config.cors_origin.as_str();

    if !bearer_ok(&headers, &config.auth_token) {
        return json_response(StatusCode::UNAUTHORIZED, json!({"error": "Unauthorized"}), cors);
    }

    let Some(session_id) = query.get("session_id").filter(|s| !s.is_empty()) else {
        return json_response(
            StatusCode::BAD_REQUEST,
            json!({"error": "session_id query parameter required"}),
            cors,
        );
    };
    let Some(session) = state.sessions.get(session_id) else {
        return json_response(
            StatusCode::NOT_FOUND,
            json!({"error": "Invalid or expired session"}),
            cors,
        );
    };

    let mut message: Value = match serde_json::from_str(&body) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "bad JSON on message endpoint");
            return json_response(StatusCode::BAD_REQUEST, parse_error_body(None), cors);
        }
    };

    inject_session_id(&mut message, session_id);

    // Client response to a server-initiated request: correlate and ack.
    // Responses matching no pending request are dropped silently.
    if is_response(&message) {
        session.handle_response(&message);
        return json_response(StatusCode::OK, json!({"status": "ok"}), cors);
    }

    match state.dispatcher.dispatch(message).await {
        Some(reply) => {
            // Deliver over the stream and echo in the POST body; the
            // duplicate is part of the transport contract.
            if let Err(e) = session.send_raw(&reply) {
                debug!(session = %session_id, error = %e, "stream delivery failed");
            }
            json_response(StatusCode::OK, reply, cors)
        }
        None => json_response(StatusCode::OK, json!({"status": "ok"}), cors),
    }
}
