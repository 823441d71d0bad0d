//! Server configuration

use std::time::Duration;

/// Configuration shared by the HTTP transports and the dispatcher
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host (default `127.0.0.1`)
    pub host: String,
    /// Bind port; `0` picks an ephemeral port
    pub port: u16,
    /// SSE event-stream path (default `/sse`)
    pub sse_path: String,
    /// SSE ingress path (default `/messages`)
    pub message_path: String,
    /// Streamable HTTP endpoint path (default `/mcp`)
    pub mcp_path: String,
    /// Bearer token; empty means unauthenticated
    pub auth_token: String,
    /// CORS origin to allow; empty means no CORS headers
    pub cors_origin: String,
    /// Maximum streamable HTTP sessions
    pub max_sessions: usize,
    /// Maximum concurrent SSE event streams
    pub max_sse_connections: usize,
    /// Per-connection outbound queue bound
    pub max_queue_size: usize,
    /// Request payload cap in bytes
    pub max_payload_bytes: usize,
    /// HTTP read timeout
    pub read_timeout: Duration,
    /// HTTP write timeout
    pub write_timeout: Duration,
    /// Idle interval between SSE heartbeat events
    pub heartbeat_interval: Duration,
    /// List page size; `<= 0` disables pagination
    pub page_size: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            sse_path: "/sse".to_string(),
            message_path: "/messages".to_string(),
            mcp_path: "/mcp".to_string(),
            auth_token: String::new(),
            cors_origin: String::new(),
            max_sessions: 1000,
            max_sse_connections: 100,
            max_queue_size: 1000,
            max_payload_bytes: 10 * 1024 * 1024,
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(15),
            page_size: 0,
        }
    }
}

impl ServerConfig {
    /// Config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Config with environment overrides applied
    ///
    /// Recognized variables: `RAPIDMCP_HOST`, `RAPIDMCP_PORT`,
    /// `RAPIDMCP_AUTH_TOKEN`, `RAPIDMCP_CORS_ORIGIN`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("RAPIDMCP_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("RAPIDMCP_PORT")
            && let Ok(port) = port.parse()
        {
            config.port = port;
        }
        if let Ok(token) = std::env::var("RAPIDMCP_AUTH_TOKEN") {
            config.auth_token = token;
        }
        if let Ok(origin) = std::env::var("RAPIDMCP_CORS_ORIGIN") {
            config.cors_origin = origin;
        }
        config
    }

    /// Set the bind host
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the bind port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the SSE paths
    #[must_use]
    pub fn with_sse_paths(
        mut self,
        sse_path: impl Into<String>,
        message_path: impl Into<String>,
    ) -> Self {
        self.sse_path = sse_path.into();
        self.message_path = message_path.into();
        self
    }

    /// Set the streamable HTTP endpoint path
    #[must_use]
    pub fn with_mcp_path(mut self, path: impl Into<String>) -> Self {
        self.mcp_path = path.into();
        self
    }

    /// Require a bearer token
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = token.into();
        self
    }

    /// Allow a CORS origin (use `*` for wildcard)
    #[must_use]
    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origin = origin.into();
        self
    }

    /// Set the SSE heartbeat interval
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the list page size (`<= 0` disables pagination)
    #[must_use]
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the session cap
    #[must_use]
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the SSE connection cap
    #[must_use]
    pub fn with_max_sse_connections(mut self, max: usize) -> Self {
        self.max_sse_connections = max;
        self
    }

    /// Bind address string
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let config = ServerConfig::default();
        assert_eq!(config.sse_path, "/sse");
        assert_eq!(config.message_path, "/messages");
        assert_eq!(config.mcp_path, "/mcp");
        assert_eq!(config.max_sessions, 1000);
        assert_eq!(config.max_sse_connections, 100);
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.max_payload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));
        assert!(config.auth_token.is_empty());
        assert!(config.cors_origin.is_empty());
    }

    #[test]
    fn builder_methods_chain() {
        let config = ServerConfig::new()
            .with_host("0.0.0.0")
            .with_port(9000)
            .with_auth_token("secret")
            .with_cors_origin("*")
            .with_page_size(25);
        assert_eq!(config.bind_addr(), "0.0.0.0:9000");
        assert_eq!(config.auth_token, "secret");
        assert_eq!(config.cors_origin, "*");
        assert_eq!(config.page_size, 25);
    }
}
