//! # rapidmcp-client
//!
//! Client-side MCP transports for the rapidmcp framework: plain HTTP POST,
//! SSE (event stream + message endpoint learned from the `endpoint`
//! handshake), WebSocket, and subprocess stdio. All transports share one
//! contract, [`ClientTransport`], and correlate responses to requests by id.
//!
//! The SSE transport additionally dispatches server-initiated requests
//! (sampling, elicitation, roots) to registered handlers and POSTs their
//! results back under the originating request id.

#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![warn(clippy::all)]

pub mod child_process;
pub mod codec;
pub mod http;
pub mod sse;
pub mod transport;
pub mod websocket;

pub use child_process::ChildProcessTransport;
pub use codec::{SseEvent, SseParser};
pub use http::HttpTransport;
pub use sse::{NotificationHandler, ServerRequestHandler, SseTransport};
pub use transport::{ClientTransport, EventHandler};
pub use websocket::WebSocketTransport;
