//! Streamable HTTP transport: a single POST endpoint with header-carried
//! session ids
//!
//! `initialize` mints a 128-bit session id returned in the
//! `Mcp-Session-Id` response header; every other request must echo it.
//! Client responses to server-initiated requests are routed through the
//! session layer instead of the dispatcher.

use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::Response;
use axum::routing::post;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, error, info};

use rapidmcp_protocol::is_response;

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::session::{Session, SessionManager};
use crate::transport::{
    bearer_ok, inject_session_id, json_response, method_not_allowed, parse_error_body,
};

/// Session id header name
pub const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Clone)]
struct StreamableState {
    dispatcher: Arc<Dispatcher>,
    sessions: Arc<SessionManager>,
    config: Arc<ServerConfig>,
}

/// Streamable HTTP server
pub struct StreamableHttpServer {
    state: StreamableState,
    serve_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl std::fmt::Debug for StreamableHttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableHttpServer")
            .field("addr", &*self.local_addr.lock())
            .finish()
    }
}

impl StreamableHttpServer {
    /// Create a server over a dispatcher and session table
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        sessions: Arc<SessionManager>,
        config: ServerConfig,
    ) -> Self {
        Self {
            state: StreamableState {
                dispatcher,
                sessions,
                config: Arc::new(config),
            },
            serve_task: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// The axum router for this server
    pub fn router(&self) -> Router {
        let config = &self.state.config;
        let mut method_router = post(mcp_post).get(mcp_get);
        if !config.cors_origin.is_empty() {
            method_router = method_router.options(mcp_options);
        }
        Router::new()
            .route(&config.mcp_path, method_router)
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
                error!(error = %e, "streamable HTTP server error");
            }
        });
        *self.serve_task.lock() = Some(task);
        info!(%addr, "streamable HTTP server listening");
        Ok(addr)
    }

    /// The bound address, when started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.state.sessions.count()
    }

    /// Session lookup for server-initiated requests
    pub fn get_session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.state.sessions.get(session_id)
    }

    /// Stop serving and drop all sessions; idempotent
    pub fn stop(&self) {
        if let Some(task) = self.serve_task.lock().take() {
            task.abort();
            debug!("streamable HTTP server stopped");
        }
        self.state.sessions.clear();
        *self.local_addr.lock() = None;
    }
}

impl Drop for StreamableHttpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn with_session_header(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(SESSION_HEADER), value);
    }
    response
}

async fn mcp_post(
    State(state): State<StreamableState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let config = &state.config;
    let cors = config.cors_origin.as_str();

    if !bearer_ok(&headers, &config.auth_token) {
        return json_response(StatusCode::UNAUTHORIZED, json!({"error": "Unauthorized"}), cors);
    }

    let mut message: Value = match serde_json::from_str(&body) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "bad JSON on streamable endpoint");
            return json_response(StatusCode::BAD_REQUEST, parse_error_body(None), cors);
        }
    };

    let is_initialize = message.get("method").and_then(Value::as_str) == Some("initialize");

    let session_id = if is_initialize {
        if state.sessions.at_capacity() {
            return json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"error": "Maximum sessions reached"}),
                cors,
            );
        }
        let session_id = SessionManager::mint_id();
        state
            .sessions
            .insert(Arc::new(Session::detached(session_id.clone())));
        session_id
    } else {
        let header_value = headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        match header_value {
            None => {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    json!({"error": "Mcp-Session-Id header required"}),
                    cors,
                );
            }
            Some(session_id) => {
                if state.sessions.get(&session_id).is_none() {
                    return json_response(
                        StatusCode::NOT_FOUND,
                        json!({"error": "Invalid or expired session"}),
                        cors,
                    );
                }
                session_id
            }
        }
    };

    inject_session_id(&mut message, &session_id);

    // Client responses to server-initiated requests bypass the dispatcher.
    if is_response(&message) {
        if let Some(session) = state.sessions.get(&session_id)
            && session.handle_response(&message)
        {
            let response = json_response(StatusCode::OK, json!({"status": "ok"}), cors);
            return with_session_header(response, &session_id);
        }
        return json_response(
            StatusCode::BAD_REQUEST,
            json!({"error": "Unknown response ID"}),
            cors,
        );
    }

    match state.dispatcher.dispatch(message).await {
        Some(reply) => {
            let response = json_response(StatusCode::OK, reply, cors);
            with_session_header(response, &session_id)
        }
        None => {
            let response = json_response(StatusCode::ACCEPTED, json!({"status": "ok"}), cors);
            with_session_header(response, &session_id)
        }
    }
}

async fn mcp_get(State(state): State<StreamableState>) -> Response {
    method_not_allowed(
        "POST",
        "The MCP endpoint only supports POST requests.",
        &state.config.cors_origin,
    )
}

async fn mcp_options(State(state): State<StreamableState>) -> Response {
    let mut response = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(axum::body::Body::empty())
        .unwrap_or_default();
    let headers = response.headers_mut();
    if let Ok(origin) = HeaderValue::from_str(&state.config.cors_origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization, Mcp-Session-Id"),
    );
    response
}
