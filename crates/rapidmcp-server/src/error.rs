//! Server error types and handling

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Server-side error kinds
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServerError {
    /// Protocol-level error (dispatch, validation, lookups)
    #[error("protocol error: {0}")]
    Protocol(#[from] rapidmcp_protocol::Error),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport-level failure (bind, accept, write)
    #[error("transport error: {0}")]
    Transport(String),

    /// Server lifecycle errors (double start, stop before start)
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServerError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a lifecycle error
    pub fn lifecycle(message: impl Into<String>) -> Self {
        Self::Lifecycle(message.into())
    }
}
