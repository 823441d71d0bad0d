//! # rapidmcp-protocol
//!
//! Protocol core for the rapidmcp MCP framework: JSON-RPC 2.0 framing and
//! classification, the shared error taxonomy, the MCP data model (tools,
//! resources, resource templates, prompts, tasks), a RFC 6570 URI-template
//! subset, and opaque cursor pagination.
//!
//! Everything here is transport-agnostic; `rapidmcp-server` and
//! `rapidmcp-client` build on these types.

#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![warn(clippy::all)]

pub mod error;
pub mod jsonrpc;
pub mod pagination;
pub mod types;
pub mod uri_template;

pub use error::{Error, McpResult};
pub use jsonrpc::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcErrorCode, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId, is_notification, is_request, is_response,
};
pub use types::{
    Icon, Implementation, PROTOCOL_VERSION, Prompt, PromptArgument, PromptMessage, Resource,
    ResourceBody, ResourceContent, ResourceTemplate, ServerCapabilities, Task, TaskStatus,
    TaskSupport, Tool, ToolFn, tool_fn, tool_fn_async,
};
pub use uri_template::UriTemplate;
