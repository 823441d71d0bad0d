//! # rapidmcp-server
//!
//! MCP server runtime for the rapidmcp framework: component registries with
//! transform chains, the JSON-RPC dispatcher, bidirectional sessions with
//! server-initiated request correlation, a background task registry with
//! lifecycle notifications, and three transports (stdio, SSE, streamable
//! HTTP) sharing one session table.
//!
//! ## Example
//!
//! ```no_run
//! use rapidmcp_server::McpServer;
//! use rapidmcp_protocol::Tool;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = McpServer::builder()
//!         .name("calculator")
//!         .tool(Tool::new(
//!             "add",
//!             json!({
//!                 "type": "object",
//!                 "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
//!                 "required": ["a", "b"],
//!             }),
//!             |args| {
//!                 let sum = args["a"].as_f64().unwrap_or(0.0) + args["b"].as_f64().unwrap_or(0.0);
//!                 Ok(json!(sum))
//!             },
//!         ))
//!         .build()?;
//!
//!     server.run_stdio().await?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod tasks;
pub mod transforms;
pub mod transport;

pub use config::ServerConfig;
pub use context::RequestContext;
pub use dispatcher::{CompletionFn, Dispatcher, RouteFn};
pub use error::{ServerError, ServerResult};
pub use registry::{PromptRegistry, ResourceRegistry, TemplateRegistry, ToolRegistry};
pub use server::{McpServer, McpServerBuilder};
pub use session::{DEFAULT_REQUEST_TIMEOUT, SendCallback, Session, SessionManager};
pub use tasks::{TaskRegistry, cancellation_requested, report_status_message};
pub use transforms::{
    ArgTransform, Namespace, PromptsAsTools, RegistryView, ResourcesAsTools, ToolTransform,
    ToolTransformConfig, Transform, TransformChain,
};
pub use transport::{SseServer, StdioTransport, StreamableHttpServer};
