//! Protocol error taxonomy and JSON-RPC code mapping

use serde_json::Value;

/// Result type for protocol-level operations
pub type McpResult<T> = Result<T, Error>;

/// Error kinds shared across the dispatcher, session layer, and transports
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Registry lookup miss (tool, resource, prompt, template, method)
    #[error("{0} not found")]
    NotFound(String),

    /// Schema mismatch, missing required field, or malformed parameters
    #[error("validation error: {0}")]
    Validation(String),

    /// Tool execution exceeded its deadline
    #[error("tool '{tool}' timeout after {timeout_ms}ms")]
    ToolTimeout {
        /// Tool that was abandoned
        tool: String,
        /// Configured deadline in milliseconds
        timeout_ms: u64,
    },

    /// `Session::send_request` deadline elapsed without a matching response
    #[error("request '{method}' timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Method of the outbound request
        method: String,
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// Error response received from the peer
    #[error("client error {code}: {message}")]
    Client {
        /// JSON-RPC error code from the peer
        code: i64,
        /// Error message from the peer
        message: String,
        /// Optional structured error data
        data: Option<Value>,
    },

    /// I/O failure or bad framing on a transport
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON encode/decode failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected failure inside a handler or the core itself
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] with a formatted subject
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Shorthand for a [`Error::Validation`]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for a [`Error::Transport`]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Shorthand for a [`Error::Internal`]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Map this error kind onto the JSON-RPC error code used on the wire
    pub fn jsonrpc_code(&self) -> i64 {
        match self {
            Self::NotFound(_) => -32601,
            Self::Validation(_) => -32602,
            Self::Client { code, .. } => *code,
            Self::Serialization(_) => -32700,
            Self::ToolTimeout { .. }
            | Self::RequestTimeout { .. }
            | Self::Transport(_)
            | Self::Internal(_) => -32603,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_mapping_matches_jsonrpc_contract() {
        assert_eq!(Error::not_found("tool 'x'").jsonrpc_code(), -32601);
        assert_eq!(Error::validation("bad args").jsonrpc_code(), -32602);
        assert_eq!(Error::internal("boom").jsonrpc_code(), -32603);
        assert_eq!(
            Error::ToolTimeout {
                tool: "slow".into(),
                timeout_ms: 10
            }
            .jsonrpc_code(),
            -32603
        );
        let client = Error::Client {
            code: -1,
            message: "rejected".into(),
            data: None,
        };
        assert_eq!(client.jsonrpc_code(), -1);
    }

    #[test]
    fn timeout_messages_mention_timeout() {
        let err = Error::ToolTimeout {
            tool: "slow".into(),
            timeout_ms: 10,
        };
        assert!(err.to_string().contains("timeout"));

        let err = Error::RequestTimeout {
            method: "sampling/createMessage".into(),
            timeout_ms: 30_000,
        };
        assert!(err.to_string().contains("timed out"));
    }
}
