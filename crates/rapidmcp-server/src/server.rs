//! Server assembly: registries + transforms + dispatcher + transports
//!
//! [`McpServer::builder`] collects components, builds the registries and the
//! dispatcher, and hands out transports sharing one session table. Late
//! registration is possible and emits the matching list-changed
//! notification to connected clients.

use std::sync::Arc;

use rapidmcp_protocol::{Implementation, McpResult, Prompt, Resource, ResourceTemplate, Tool};

use crate::config::ServerConfig;
use crate::dispatcher::{CompletionFn, Dispatcher, RouteFn};
use crate::error::ServerResult;
use crate::session::SessionManager;
use crate::tasks::TaskRegistry;
use crate::transforms::{RegistryView, Transform, TransformChain};
use crate::transport::{SseServer, StdioTransport, StreamableHttpServer};

/// Builder for [`McpServer`]
pub struct McpServerBuilder {
    name: String,
    title: Option<String>,
    version: String,
    config: ServerConfig,
    view: RegistryView,
    transforms: Vec<Arc<dyn Transform>>,
    routes: Vec<(String, RouteFn)>,
    completions: Vec<(String, String, CompletionFn)>,
    pending_error: Option<rapidmcp_protocol::Error>,
}

impl std::fmt::Debug for McpServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServerBuilder")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish()
    }
}

impl McpServerBuilder {
    fn new() -> Self {
        Self {
            name: "rapidmcp".to_string(),
            title: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            config: ServerConfig::default(),
            view: RegistryView::default(),
            transforms: Vec::new(),
            routes: Vec::new(),
            completions: Vec::new(),
            pending_error: None,
        }
    }

    /// Set the server name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the human-readable title
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the server version
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the server configuration
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    fn record<T>(&mut self, result: McpResult<T>) {
        if let Err(e) = result
            && self.pending_error.is_none()
        {
            self.pending_error = Some(e);
        }
    }

    /// Register a tool
    #[must_use]
    pub fn tool(mut self, tool: Tool) -> Self {
        let result = self.view.tools.register(tool);
        self.record(result);
        self
    }

    /// Register a resource
    #[must_use]
    pub fn resource(mut self, resource: Resource) -> Self {
        let result = self.view.resources.register(resource);
        self.record(result);
        self
    }

    /// Register a resource template
    #[must_use]
    pub fn template(mut self, template: ResourceTemplate) -> Self {
        let result = self.view.templates.register(template);
        self.record(result);
        self
    }

    /// Register a prompt
    #[must_use]
    pub fn prompt(mut self, prompt: Prompt) -> Self {
        let result = self.view.prompts.register(prompt);
        self.record(result);
        self
    }

    /// Append a registry transform (later transforms wrap earlier ones)
    #[must_use]
    pub fn transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Register an extension route
    #[must_use]
    pub fn route(mut self, method: impl Into<String>, handler: RouteFn) -> Self {
        self.routes.push((method.into(), handler));
        self
    }

    /// Register a completion provider (`ref/prompt` or `ref/resource`)
    #[must_use]
    pub fn completion(
        mut self,
        ref_type: impl Into<String>,
        name: impl Into<String>,
        provider: CompletionFn,
    ) -> Self {
        self.completions
            .push((ref_type.into(), name.into(), provider));
        self
    }

    /// Assemble the server
    pub fn build(self) -> ServerResult<McpServer> {
        if let Some(e) = self.pending_error {
            return Err(e.into());
        }

        let sessions = Arc::new(SessionManager::new(self.config.max_sessions));
        let tasks = TaskRegistry::new();
        let chain = TransformChain::new(self.view.clone(), self.transforms);

        let server_info = Implementation {
            name: self.name,
            title: self.title,
            version: self.version,
        };

        let mut dispatcher = Dispatcher::new(
            server_info,
            chain,
            Arc::clone(&sessions),
            tasks.clone(),
        )
        .with_page_size(self.config.page_size);
        for (method, handler) in self.routes {
            dispatcher = dispatcher.with_route(method, handler);
        }
        for (ref_type, name, provider) in self.completions {
            dispatcher = dispatcher.with_completion(&ref_type, &name, provider);
        }

        Ok(McpServer {
            config: self.config,
            view: self.view,
            sessions,
            tasks,
            dispatcher: Arc::new(dispatcher),
        })
    }
}

/// An assembled MCP server
pub struct McpServer {
    config: ServerConfig,
    view: RegistryView,
    sessions: Arc<SessionManager>,
    tasks: TaskRegistry,
    dispatcher: Arc<Dispatcher>,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("tools", &self.view.tools.len())
            .field("sessions", &self.sessions.count())
            .finish()
    }
}

impl McpServer {
    /// Start building a server
    pub fn builder() -> McpServerBuilder {
        McpServerBuilder::new()
    }

    /// The dispatcher, for in-process use and tests
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// The shared session table
    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    /// The task registry
    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    /// The server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve stdin/stdout until EOF
    pub async fn run_stdio(&self) -> ServerResult<()> {
        StdioTransport::new(Arc::clone(&self.dispatcher), Arc::clone(&self.sessions))
            .run()
            .await
    }

    /// Create the SSE transport (call [`SseServer::start`] to bind)
    pub fn sse_server(&self) -> SseServer {
        SseServer::new(
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.sessions),
            self.config.clone(),
        )
    }

    /// Create the streamable HTTP transport (call
    /// [`StreamableHttpServer::start`] to bind)
    pub fn streamable_server(&self) -> StreamableHttpServer {
        StreamableHttpServer::new(
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.sessions),
            self.config.clone(),
        )
    }

    /// Register a tool after startup and notify connected clients
    pub fn register_tool(&self, tool: Tool) -> McpResult<()> {
        self.view.tools.register(tool)?;
        self.sessions
            .broadcast("notifications/tools/list_changed", serde_json::json!({}));
        Ok(())
    }

    /// Register a resource after startup and notify connected clients
    pub fn register_resource(&self, resource: Resource) -> McpResult<()> {
        self.view.resources.register(resource)?;
        self.sessions.broadcast(
            "notifications/resources/list_changed",
            serde_json::json!({}),
        );
        Ok(())
    }

    /// Register a prompt after startup and notify connected clients
    pub fn register_prompt(&self, prompt: Prompt) -> McpResult<()> {
        self.view.prompts.register(prompt)?;
        self.sessions
            .broadcast("notifications/prompts/list_changed", serde_json::json!({}));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_registration_fails_at_build() {
        let result = McpServer::builder()
            .tool(Tool::new("dup", json!({}), Ok))
            .tool(Tool::new("dup", json!({}), Ok))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn built_server_dispatches_ping() {
        let server = McpServer::builder().name("t").build().unwrap();
        let response = server
            .dispatcher()
            .dispatch(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
            .await
            .unwrap();
        assert_eq!(response["result"], json!({}));
    }
}
