//! HTTP client transport
//!
//! Plain request/response over POST; `request_stream` understands
//! SSE-framed response bodies and suppresses consecutive duplicate events
//! (the server-side SSE transport intentionally double-delivers replies).

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use rapidmcp_protocol::{Error, McpResult};

use crate::codec::SseParser;
use crate::transport::{
    ClientTransport, EventHandler, RequestIds, notification_envelope, request_envelope,
    unwrap_response,
};

/// HTTP POST transport
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    auth_token: Option<String>,
    ids: RequestIds,
}

impl HttpTransport {
    /// Create a transport POSTing to `url` (e.g. `http://127.0.0.1:8080/mcp`)
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            auth_token: None,
            ids: RequestIds::default(),
        }
    }

    /// Attach a bearer token to every request
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn builder(&self) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(&self.url);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

#[async_trait]
impl ClientTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> McpResult<Value> {
        let id = self.ids.next();
        let envelope = request_envelope(&id, method, params);

        let response = self
            .builder()
            .json(&envelope)
            .send()
            .await
            .map_err(|e| Error::transport(format!("HTTP request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(format!("HTTP error: {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::transport(format!("invalid response body: {e}")))?;
        unwrap_response(&body)
    }

    async fn notify(&self, method: &str, params: Value) -> McpResult<()> {
        let envelope = notification_envelope(method, params);
        let response = self
            .builder()
            .json(&envelope)
            .send()
            .await
            .map_err(|e| Error::transport(format!("HTTP notify failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::transport(format!("HTTP error: {}", response.status())));
        }
        Ok(())
    }

    async fn request_stream(
        &self,
        method: &str,
        params: Value,
        on_event: EventHandler,
    ) -> McpResult<Value> {
        let id = self.ids.next();
        let envelope = request_envelope(&id, method, params);

        let response = self
            .builder()
            .header(reqwest::header::ACCEPT, "text/event-stream, application/json")
            .json(&envelope)
            .send()
            .await
            .map_err(|e| Error::transport(format!("HTTP request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(format!("HTTP error: {status}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.starts_with("text/event-stream") {
            let body: Value = response
                .json()
                .await
                .map_err(|e| Error::transport(format!("invalid response body: {e}")))?;
            let result = unwrap_response(&body)?;
            on_event(result.clone());
            return Ok(result);
        }

        let mut parser = SseParser::new();
        let mut last_emitted: Option<String> = None;
        let mut final_result = Value::Null;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::transport(format!("stream read failed: {e}")))?;
            let text = String::from_utf8_lossy(&chunk);
            for event in parser.push(&text) {
                if event.data.is_empty() || last_emitted.as_deref() == Some(&event.data) {
                    continue;
                }
                last_emitted = Some(event.data.clone());
                let Ok(value) = serde_json::from_str::<Value>(&event.data) else {
                    continue;
                };
                if value.get("id").and_then(Value::as_str) == Some(id.as_str()) {
                    final_result = unwrap_response(&value)?;
                }
                on_event(value);
            }
        }
        Ok(final_result)
    }
}
