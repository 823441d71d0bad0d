//! Core MCP data types: tools, resources, templates, prompts, and tasks
//!
//! Handler functions are boxed async closures so registries stay object-safe
//! and tools can be cloned into derived (transformed) tools cheaply.

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, McpResult};
use crate::uri_template::UriTemplate;

/// MCP protocol revision echoed by `initialize`
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Well-known `_meta` keys
pub mod meta {
    /// Marks a `tools/call` request for background task execution
    pub const TASK: &str = "modelcontextprotocol.io/task";
    /// Carries the task id on task lifecycle notifications
    pub const RELATED_TASK: &str = "modelcontextprotocol.io/related-task";
    /// Progress token supplied by the caller
    pub const PROGRESS_TOKEN: &str = "progressToken";
    /// Session id injected by the HTTP transports
    pub const SESSION_ID: &str = "session_id";
}

/// Server or client implementation info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    /// Implementation name
    pub name: String,
    /// Human-readable title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Implementation version
    pub version: String,
}

/// Icon descriptor for UI display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Icon {
    /// URL or data URI for the icon
    pub src: String,
    /// Optional MIME type (e.g. `image/png`)
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Optional dimensions (e.g. `["48x48"]`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Whether a tool can run as a background task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSupport {
    /// Tool never runs as a task
    #[default]
    None,
    /// Tool may run as a task when the caller asks for one
    Optional,
    /// Tool must run as a task
    Required,
}

/// Boxed async tool handler: `(input) -> output`
pub type ToolFn = Arc<dyn Fn(Value) -> BoxFuture<'static, McpResult<Value>> + Send + Sync>;

/// Wrap a synchronous closure into a [`ToolFn`]
///
/// The closure runs lazily when the returned future is polled, so timeout
/// enforcement still applies.
pub fn tool_fn<F>(f: F) -> ToolFn
where
    F: Fn(Value) -> McpResult<Value> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |input| {
        let f = Arc::clone(&f);
        async move { f(input) }.boxed()
    })
}

/// Wrap an async closure into a [`ToolFn`]
pub fn tool_fn_async<F, Fut>(f: F) -> ToolFn
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = McpResult<Value>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |input| {
        let f = Arc::clone(&f);
        async move { f(input).await }.boxed()
    })
}

/// An invocable tool with input/output schemas and timeout policy
#[derive(Clone)]
pub struct Tool {
    /// Unique tool name within a registry
    pub name: String,
    /// Human-readable title
    pub title: Option<String>,
    /// Tool description
    pub description: Option<String>,
    /// JSON schema describing the argument object
    pub input_schema: Value,
    /// Optional JSON schema describing the result
    pub output_schema: Option<Value>,
    /// Optional icon descriptors
    pub icons: Option<Vec<Icon>>,
    /// Invocation deadline; zero disables enforcement
    pub timeout: Duration,
    /// Task execution policy
    pub task_support: TaskSupport,
    handler: ToolFn,
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("task_support", &self.task_support)
            .finish()
    }
}

impl Tool {
    /// Create a tool from a synchronous handler
    pub fn new<F>(name: impl Into<String>, input_schema: Value, f: F) -> Self
    where
        F: Fn(Value) -> McpResult<Value> + Send + Sync + 'static,
    {
        Self::with_handler(name, input_schema, tool_fn(f))
    }

    /// Create a tool from an async handler
    pub fn new_async<F, Fut>(name: impl Into<String>, input_schema: Value, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = McpResult<Value>> + Send + 'static,
    {
        Self::with_handler(name, input_schema, tool_fn_async(f))
    }

    /// Create a tool from an already-boxed handler
    pub fn with_handler(name: impl Into<String>, input_schema: Value, handler: ToolFn) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            input_schema,
            output_schema: None,
            icons: None,
            timeout: Duration::ZERO,
            task_support: TaskSupport::None,
            handler,
        }
    }

    /// Set the title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the output schema
    #[must_use]
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Set icon descriptors
    #[must_use]
    pub fn with_icons(mut self, icons: Vec<Icon>) -> Self {
        self.icons = Some(icons);
        self
    }

    /// Set the invocation timeout (zero disables)
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the task execution policy
    #[must_use]
    pub fn with_task_support(mut self, support: TaskSupport) -> Self {
        self.task_support = support;
        self
    }

    /// The underlying handler, for derived tools
    pub fn handler(&self) -> ToolFn {
        Arc::clone(&self.handler)
    }

    /// Invoke the handler without timeout enforcement
    pub async fn invoke(&self, input: Value) -> McpResult<Value> {
        (self.handler)(input).await
    }

    /// Invoke the handler as a future (for callers that add their own scope)
    pub fn invoke_future(&self, input: Value) -> BoxFuture<'static, McpResult<Value>> {
        (self.handler)(input)
    }

    /// Invoke with timeout enforcement
    ///
    /// The handler runs on a spawned worker; past the deadline the caller
    /// sees [`Error::ToolTimeout`] while the worker runs to natural
    /// completion with its result discarded.
    pub async fn invoke_with_timeout(&self, input: Value, enforce: bool) -> McpResult<Value> {
        let fut = (self.handler)(input);
        self.enforce_timeout(fut, enforce).await
    }

    /// Apply this tool's timeout policy to an already-built handler future
    ///
    /// Callers that wrap the handler future (request-context scoping, task
    /// scoping) build the future themselves and hand it here for deadline
    /// enforcement.
    pub async fn enforce_timeout(
        &self,
        fut: BoxFuture<'static, McpResult<Value>>,
        enforce: bool,
    ) -> McpResult<Value> {
        if !enforce || self.timeout.is_zero() {
            return fut.await;
        }
        let worker = tokio::spawn(fut);
        match tokio::time::timeout(self.timeout, worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(Error::internal(format!(
                "tool '{}' worker failed: {join}",
                self.name
            ))),
            Err(_) => Err(Error::ToolTimeout {
                tool: self.name.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// Wire-facing tool definition for `tools/list`
    pub fn to_definition(&self) -> Value {
        let mut def = Map::new();
        def.insert("name".into(), json!(self.name));
        if let Some(title) = &self.title {
            def.insert("title".into(), json!(title));
        }
        if let Some(description) = &self.description {
            def.insert("description".into(), json!(description));
        }
        def.insert("inputSchema".into(), self.input_schema.clone());
        if let Some(schema) = &self.output_schema {
            def.insert("outputSchema".into(), schema.clone());
        }
        if let Some(icons) = &self.icons {
            def.insert("icons".into(), json!(icons));
        }
        if self.task_support != TaskSupport::None {
            def.insert("execution".into(), json!({ "taskSupport": self.task_support }));
        }
        Value::Object(def)
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// Resource payload: UTF-8 text or opaque bytes
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceBody {
    /// Text content
    Text(String),
    /// Binary content (base64-encoded on the wire)
    Blob(Vec<u8>),
}

/// Resource content plus MIME type hint
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceContent {
    /// The payload
    pub body: ResourceBody,
    /// MIME type hint
    pub mime_type: Option<String>,
}

impl ResourceContent {
    /// Text content
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            body: ResourceBody::Text(text.into()),
            mime_type: Some("text/plain".to_string()),
        }
    }

    /// Binary content with an explicit MIME type
    pub fn blob(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            body: ResourceBody::Blob(bytes),
            mime_type: Some(mime_type.into()),
        }
    }

    /// Override the MIME type
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Text payload, if this is text content
    pub fn as_text(&self) -> Option<&str> {
        match &self.body {
            ResourceBody::Text(text) => Some(text),
            ResourceBody::Blob(_) => None,
        }
    }

    /// Wire entry for a `resources/read` result
    pub fn to_wire(&self, uri: &str) -> Value {
        use base64::Engine as _;
        let mut entry = Map::new();
        entry.insert("uri".into(), json!(uri));
        if let Some(mime) = &self.mime_type {
            entry.insert("mimeType".into(), json!(mime));
        }
        match &self.body {
            ResourceBody::Text(text) => {
                entry.insert("text".into(), json!(text));
            }
            ResourceBody::Blob(bytes) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                entry.insert("blob".into(), json!(encoded));
            }
        }
        Value::Object(entry)
    }
}

/// Resource provider: `(params) -> content`
pub type ResourceFn = Arc<dyn Fn(&Value) -> McpResult<ResourceContent> + Send + Sync>;

#[derive(Clone)]
enum ResourceSource {
    Static(ResourceContent),
    Provider(ResourceFn),
}

/// A readable resource addressed by URI
#[derive(Clone)]
pub struct Resource {
    /// Resource URI
    pub uri: String,
    /// Resource name
    pub name: String,
    /// Human-readable title
    pub title: Option<String>,
    /// Description
    pub description: Option<String>,
    /// MIME type hint
    pub mime_type: Option<String>,
    /// Arbitrary metadata
    pub meta: Option<Value>,
    /// Icon descriptors
    pub icons: Option<Vec<Icon>>,
    source: ResourceSource,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("uri", &self.uri)
            .field("name", &self.name)
            .finish()
    }
}

impl Resource {
    /// Resource backed by static content
    pub fn new_static(
        uri: impl Into<String>,
        name: impl Into<String>,
        content: ResourceContent,
    ) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            title: None,
            description: None,
            mime_type: content.mime_type.clone(),
            meta: None,
            icons: None,
            source: ResourceSource::Static(content),
        }
    }

    /// Resource backed by a provider function
    pub fn new_provider<F>(uri: impl Into<String>, name: impl Into<String>, provider: F) -> Self
    where
        F: Fn(&Value) -> McpResult<ResourceContent> + Send + Sync + 'static,
    {
        Self {
            uri: uri.into(),
            name: name.into(),
            title: None,
            description: None,
            mime_type: None,
            meta: None,
            icons: None,
            source: ResourceSource::Provider(Arc::new(provider)),
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the MIME type hint
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Attach arbitrary metadata
    #[must_use]
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Rewrite the URI (used by the namespace transform)
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Read the content
    pub fn read(&self, params: &Value) -> McpResult<ResourceContent> {
        match &self.source {
            ResourceSource::Static(content) => Ok(content.clone()),
            ResourceSource::Provider(provider) => provider(params),
        }
    }

    /// Wire-facing definition for `resources/list`
    pub fn to_definition(&self) -> Value {
        let mut def = Map::new();
        def.insert("uri".into(), json!(self.uri));
        def.insert("name".into(), json!(self.name));
        if let Some(title) = &self.title {
            def.insert("title".into(), json!(title));
        }
        if let Some(description) = &self.description {
            def.insert("description".into(), json!(description));
        }
        if let Some(mime) = &self.mime_type {
            def.insert("mimeType".into(), json!(mime));
        }
        if let Some(icons) = &self.icons {
            def.insert("icons".into(), json!(icons));
        }
        if let Some(meta) = &self.meta {
            def.insert("_meta".into(), meta.clone());
        }
        Value::Object(def)
    }
}

/// A URI-template-backed resource provider
#[derive(Clone)]
pub struct ResourceTemplate {
    /// Compiled URI template
    pub uri_template: UriTemplate,
    /// Template name
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// MIME type hint
    pub mime_type: Option<String>,
    provider: ResourceFn,
}

impl fmt::Debug for ResourceTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTemplate")
            .field("uri_template", &self.uri_template.template())
            .field("name", &self.name)
            .finish()
    }
}

impl ResourceTemplate {
    /// Compile a template and attach its provider
    pub fn new<F>(
        uri_template: impl AsRef<str>,
        name: impl Into<String>,
        provider: F,
    ) -> McpResult<Self>
    where
        F: Fn(&Value) -> McpResult<ResourceContent> + Send + Sync + 'static,
    {
        Ok(Self {
            uri_template: UriTemplate::parse(uri_template.as_ref())?,
            name: name.into(),
            description: None,
            mime_type: None,
            provider: Arc::new(provider),
        })
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the MIME type hint
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Rebuild this template under a different URI pattern, keeping the provider
    pub fn with_uri_template(&self, uri_template: &str) -> McpResult<Self> {
        Ok(Self {
            uri_template: UriTemplate::parse(uri_template)?,
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            provider: Arc::clone(&self.provider),
        })
    }

    /// Match a URI, returning extracted parameters
    pub fn match_uri(&self, uri: &str) -> Option<Vec<(String, String)>> {
        self.uri_template.match_uri(uri)
    }

    /// Read content for extracted parameters
    pub fn read(&self, params: &Value) -> McpResult<ResourceContent> {
        (self.provider)(params)
    }

    /// Wire-facing definition for `resources/templates/list`
    pub fn to_definition(&self) -> Value {
        let mut def = Map::new();
        def.insert("uriTemplate".into(), json!(self.uri_template.template()));
        def.insert("name".into(), json!(self.name));
        if let Some(description) = &self.description {
            def.insert("description".into(), json!(description));
        }
        if let Some(mime) = &self.mime_type {
            def.insert("mimeType".into(), json!(mime));
        }
        Value::Object(def)
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// A prompt argument descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name
    pub name: String,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument is required
    #[serde(default)]
    pub required: bool,
}

/// A rendered prompt message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Message role (`user` or `assistant`)
    pub role: String,
    /// Message content (MCP content object)
    pub content: Value,
}

impl PromptMessage {
    /// A user text message
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: json!({"type": "text", "text": text.into()}),
        }
    }
}

/// Prompt generator: `(args) -> messages`
pub type PromptFn = Arc<dyn Fn(&Value) -> McpResult<Vec<PromptMessage>> + Send + Sync>;

#[derive(Clone)]
enum PromptBody {
    Template(String),
    Generator(PromptFn),
}

/// A named prompt rendered from a `{var}` template or a generator function
#[derive(Clone)]
pub struct Prompt {
    /// Prompt name
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Declared arguments
    pub arguments: Vec<PromptArgument>,
    body: PromptBody,
}

impl fmt::Debug for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prompt").field("name", &self.name).finish()
    }
}

impl Prompt {
    /// Prompt backed by a `{var}` template string
    pub fn from_template(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
            body: PromptBody::Template(template.into()),
        }
    }

    /// Prompt backed by a generator function
    pub fn from_generator<F>(name: impl Into<String>, generator: F) -> Self
    where
        F: Fn(&Value) -> McpResult<Vec<PromptMessage>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
            body: PromptBody::Generator(Arc::new(generator)),
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare an argument
    #[must_use]
    pub fn with_argument(
        mut self,
        name: impl Into<String>,
        description: Option<&str>,
        required: bool,
    ) -> Self {
        self.arguments.push(PromptArgument {
            name: name.into(),
            description: description.map(String::from),
            required,
        });
        self
    }

    /// Rename this prompt (used by the namespace transform)
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The template string, when template-backed
    pub fn template_string(&self) -> Option<&str> {
        match &self.body {
            PromptBody::Template(template) => Some(template),
            PromptBody::Generator(_) => None,
        }
    }

    /// Render with an argument object
    ///
    /// Template prompts substitute every `{var}` occurrence with the string
    /// form of the supplied value; non-string values use their compact JSON
    /// encoding. Missing arguments leave the placeholder untouched.
    pub fn render(&self, args: &Value) -> McpResult<Vec<PromptMessage>> {
        match &self.body {
            PromptBody::Template(template) => {
                let mut out = template.clone();
                if let Some(map) = args.as_object() {
                    for (key, value) in map {
                        let placeholder = format!("{{{key}}}");
                        let replacement = match value {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        out = out.replace(&placeholder, &replacement);
                    }
                }
                Ok(vec![PromptMessage::user_text(out)])
            }
            PromptBody::Generator(generator) => generator(args),
        }
    }

    /// Wire-facing definition for `prompts/list`
    pub fn to_definition(&self) -> Value {
        let mut def = Map::new();
        def.insert("name".into(), json!(self.name));
        if let Some(description) = &self.description {
            def.insert("description".into(), json!(description));
        }
        if !self.arguments.is_empty() {
            def.insert("arguments".into(), json!(self.arguments));
        }
        Value::Object(def)
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Background task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted, not yet running
    Submitted,
    /// Running
    Working,
    /// Waiting on client input
    InputRequired,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Cancelled before completion
    Cancelled,
}

impl TaskStatus {
    /// Terminal states are sticky
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Task lifecycle record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Opaque unique task id
    pub task_id: String,
    /// Tool being invoked
    pub tool_name: String,
    /// Current lifecycle state
    pub status: TaskStatus,
    /// Free-text status message updated by the tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Tool result, set on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message, set on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time-to-live in milliseconds
    pub ttl: u64,
    /// RFC 3339 creation timestamp
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Capability block with a list-changed flag
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListChangedCapability {
    /// Whether list-changed notifications are emitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Capabilities advertised by the server on `initialize`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tool support
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListChangedCapability>,
    /// Resource support
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ListChangedCapability>,
    /// Prompt support
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<ListChangedCapability>,
    /// Logging support
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
    /// Completion support
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<Value>,
    /// Task support
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[tokio::test]
    async fn tool_invokes_handler() {
        let tool = Tool::new("add", json!({"type": "object"}), |input| {
            let a = input["a"].as_i64().unwrap_or(0);
            let b = input["b"].as_i64().unwrap_or(0);
            Ok(json!(a + b))
        });
        let out = tool.invoke(json!({"a": 2, "b": 3})).await.unwrap();
        assert_eq!(out, json!(5));
    }

    #[tokio::test]
    async fn tool_timeout_abandons_slow_handler() {
        let tool = Tool::new_async("slow", json!({"type": "object"}), |_| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(json!({"ok": true}))
        })
        .with_timeout(Duration::from_millis(10));

        let err = tool
            .invoke_with_timeout(json!({}), true)
            .await
            .expect_err("deadline should fire");
        assert!(matches!(err, Error::ToolTimeout { .. }));

        // Enforcement off: the same tool completes.
        let out = tool.invoke_with_timeout(json!({}), false).await.unwrap();
        assert_eq!(out, json!({"ok": true}));
    }

    #[test]
    fn tool_definition_shape() {
        let tool = Tool::new("greet", json!({"type": "object"}), |_| Ok(json!("hi")))
            .with_description("Greets")
            .with_task_support(TaskSupport::Optional);
        let def = tool.to_definition();
        assert_eq!(def["name"], json!("greet"));
        assert_eq!(def["description"], json!("Greets"));
        assert_eq!(def["execution"]["taskSupport"], json!("optional"));
        assert!(def.get("outputSchema").is_none());
    }

    #[test]
    fn resource_static_and_provider_reads() {
        let fixed = Resource::new_static("memo://note", "note", ResourceContent::text("hello"));
        assert_eq!(fixed.read(&json!({})).unwrap().as_text(), Some("hello"));

        let dynamic = Resource::new_provider("gen://x", "x", |params| {
            Ok(ResourceContent::text(format!(
                "param={}",
                params["p"].as_str().unwrap_or("-")
            )))
        });
        assert_eq!(
            dynamic.read(&json!({"p": "v"})).unwrap().as_text(),
            Some("param=v")
        );
    }

    #[test]
    fn blob_content_is_base64_on_the_wire() {
        let content = ResourceContent::blob(vec![0xde, 0xad, 0xbe, 0xef], "application/octet-stream");
        let wire = content.to_wire("bin://x");
        assert_eq!(wire["blob"], json!("3q2+7w=="));
        assert_eq!(wire["mimeType"], json!("application/octet-stream"));
    }

    #[test]
    fn prompt_template_substitutes_every_occurrence() {
        let prompt = Prompt::from_template("greet", "Hi {name}, welcome {name}! Level: {level}");
        let messages = prompt
            .render(&json!({"name": "Ada", "level": 3}))
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].content["text"],
            json!("Hi Ada, welcome Ada! Level: 3")
        );
    }

    #[test]
    fn task_status_terminality() {
        assert!(!TaskStatus::Submitted.is_terminal());
        assert!(!TaskStatus::Working.is_terminal());
        assert!(!TaskStatus::InputRequired.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert_eq!(
            serde_json::to_value(TaskStatus::InputRequired).unwrap(),
            json!("input_required")
        );
    }

    #[test]
    fn icon_serde_uses_mime_type_key() {
        let icon = Icon {
            src: "https://example.com/icon.png".into(),
            mime_type: Some("image/png".into()),
            sizes: Some(vec!["48x48".into()]),
        };
        let wire = serde_json::to_value(&icon).unwrap();
        assert_eq!(wire["mimeType"], json!("image/png"));
        let back: Icon = serde_json::from_value(wire).unwrap();
        assert_eq!(back, icon);
    }
}
