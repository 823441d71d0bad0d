//! JSON-RPC method router
//!
//! `dispatch` resolves the method against a fixed routing table plus
//! registered extension routes, invokes the registries through the transform
//! chain, and converts every handler failure into a JSON-RPC error response.
//! Notifications produce no response. Method names are case-sensitive and
//! matched exactly; responses echo the caller's original id value.

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use rapidmcp_protocol::{
    Error, Implementation, McpResult, PROTOCOL_VERSION, RequestId, ServerCapabilities, TaskSupport,
    Tool, types::ListChangedCapability, types::meta,
};

use crate::context::RequestContext;
use crate::session::SessionManager;
use crate::tasks::TaskRegistry;
use crate::transforms::TransformChain;

/// Extension route handler
pub type RouteFn =
    Arc<dyn Fn(Value, RequestContext) -> BoxFuture<'static, McpResult<Value>> + Send + Sync>;

/// Completion provider: `(argument name, current value) -> suggestions`
pub type CompletionFn = Arc<dyn Fn(&str, &str) -> Vec<String> + Send + Sync>;

/// The in-process MCP method router
pub struct Dispatcher {
    server_info: Implementation,
    view: TransformChain,
    sessions: Arc<SessionManager>,
    tasks: TaskRegistry,
    page_size: i64,
    routes: HashMap<String, RouteFn>,
    completions: HashMap<String, CompletionFn>,
    subscriptions: DashMap<String, usize>,
    log_level: Mutex<String>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("server", &self.server_info.name)
            .field("extension_routes", &self.routes.len())
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher over a transform chain
    pub fn new(
        server_info: Implementation,
        view: TransformChain,
        sessions: Arc<SessionManager>,
        tasks: TaskRegistry,
    ) -> Self {
        Self {
            server_info,
            view,
            sessions,
            tasks,
            page_size: 0,
            routes: HashMap::new(),
            completions: HashMap::new(),
            subscriptions: DashMap::new(),
            log_level: Mutex::new("info".to_string()),
        }
    }

    /// Set the list page size (`<= 0` disables pagination)
    #[must_use]
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Register an extension route
    #[must_use]
    pub fn with_route(mut self, method: impl Into<String>, handler: RouteFn) -> Self {
        self.routes.insert(method.into(), handler);
        self
    }

    /// Register a completion provider for `ref/prompt` or `ref/resource`
    #[must_use]
    pub fn with_completion(
        mut self,
        ref_type: &str,
        name: &str,
        provider: CompletionFn,
    ) -> Self {
        self.completions
            .insert(format!("{ref_type}:{name}"), provider);
        self
    }

    /// The session table this dispatcher resolves `_meta.session_id` against
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// The task registry driven by `tools/call` task requests
    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    /// Currently configured log level
    pub fn log_level(&self) -> String {
        self.log_level.lock().clone()
    }

    /// Route one message; `None` for notifications and id-less requests
    pub async fn dispatch(&self, message: Value) -> Option<Value> {
        let method = message.get("method")?.as_str()?.to_string();
        let raw_id = message.get("id").cloned().filter(|id| !id.is_null());
        let params = message.get("params").cloned().unwrap_or_else(|| json!({}));

        let request_id = raw_id.as_ref().and_then(RequestId::from_value);
        let ctx = RequestContext::from_params(request_id, &params, &self.sessions);

        if let Some(rest) = method.strip_prefix("notifications/") {
            self.handle_notification(rest, &params);
            return None;
        }

        let result = self.route(&method, params, ctx).await;
        let id = raw_id?;

        Some(match result {
            Ok(result) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": result,
            }),
            Err(error) => {
                debug!(method = %method, error = %error, "request failed");
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {
                        "code": error.jsonrpc_code(),
                        "message": error.to_string(),
                    },
                })
            }
        })
    }

    async fn route(&self, method: &str, params: Value, ctx: RequestContext) -> McpResult<Value> {
        match method {
            "initialize" => self.handle_initialize(params, ctx),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.paginated("tools", self.tool_definitions(), &params)),
            "tools/call" => self.handle_call_tool(params, ctx).await,
            "resources/list" => {
                let items = self
                    .view
                    .list_resources()
                    .iter()
                    .map(|r| r.to_definition())
                    .collect();
                Ok(self.paginated("resources", items, &params))
            }
            "resources/read" => self.handle_read_resource(params),
            "resources/templates/list" => {
                let items = self
                    .view
                    .list_templates()
                    .iter()
                    .map(|t| t.to_definition())
                    .collect();
                Ok(self.paginated("resourceTemplates", items, &params))
            }
            "resources/subscribe" => self.handle_subscribe(params, true),
            "resources/unsubscribe" => self.handle_subscribe(params, false),
            "prompts/list" => {
                let items = self
                    .view
                    .list_prompts()
                    .iter()
                    .map(|p| p.to_definition())
                    .collect();
                Ok(self.paginated("prompts", items, &params))
            }
            "prompts/get" => self.handle_get_prompt(params),
            "completion/complete" => self.handle_complete(params),
            "logging/setLevel" => self.handle_set_level(params),
            "tasks/get" => self.handle_task_get(params),
            "tasks/result" => self.handle_task_result(params),
            "tasks/cancel" => self.handle_task_cancel(params),
            other => match self.routes.get(other) {
                Some(handler) => handler(params, ctx).await,
                None => Err(Error::not_found(format!("Method '{other}'"))),
            },
        }
    }

    fn handle_notification(&self, kind: &str, params: &Value) {
        match kind {
            "initialized" => {}
            "cancelled" => {
                let reason = params
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(String::from);
                if let Some(request_id) = params.get("requestId").and_then(RequestId::from_value) {
                    self.tasks.cancel_by_request(&request_id.as_key(), reason);
                }
            }
            other => debug!(notification = other, "unhandled notification"),
        }
    }

    // -----------------------------------------------------------------------
    // Built-in handlers
    // -----------------------------------------------------------------------

    fn handle_initialize(&self, params: Value, ctx: RequestContext) -> McpResult<Value> {
        if let Some(session) = &ctx.session
            && let Some(capabilities) = params.get("capabilities")
        {
            session.set_capabilities(capabilities.clone());
        }
        Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": &self.server_info,
            "capabilities": self.capabilities(),
        }))
    }

    fn capabilities(&self) -> ServerCapabilities {
        let base = self.view.base();
        let listing = || {
            Some(ListChangedCapability {
                list_changed: Some(true),
            })
        };
        ServerCapabilities {
            tools: (!base.tools.is_empty()).then(listing).flatten(),
            resources: (!base.resources.is_empty() || !base.templates.is_empty())
                .then(listing)
                .flatten(),
            prompts: (!base.prompts.is_empty()).then(listing).flatten(),
            logging: Some(json!({})),
            completions: (!self.completions.is_empty()).then(|| json!({})),
            tasks: self
                .view
                .list_tools()
                .iter()
                .any(|t| t.task_support != TaskSupport::None)
                .then(|| json!({})),
        }
    }

    fn tool_definitions(&self) -> Vec<Value> {
        self.view
            .list_tools()
            .iter()
            .map(|t| t.to_definition())
            .collect()
    }

    fn paginated(&self, key: &str, items: Vec<Value>, params: &Value) -> Value {
        let cursor = params.get("cursor").and_then(Value::as_str);
        let page = rapidmcp_protocol::pagination::paginate(&items, cursor, self.page_size);
        let has_more = page.next_cursor.is_some();

        let mut result = Map::new();
        result.insert(key.to_string(), json!(page.items));
        if let Some(next) = page.next_cursor {
            result.insert("nextCursor".to_string(), json!(next));
        }
        if self.page_size > 0 {
            result.insert("_meta".to_string(), json!({ "hasMore": has_more }));
        }
        Value::Object(result)
    }

    async fn handle_call_tool(&self, params: Value, ctx: RequestContext) -> McpResult<Value> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("missing tool name"))?;
        if name.trim().is_empty() {
            return Err(Error::validation("tool name must not be empty"));
        }

        let tool = self
            .view
            .get_tool(name)
            .ok_or_else(|| Error::not_found(format!("Tool '{name}'")))?;
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));
        validate_arguments(&tool, &arguments)?;

        let task_meta = params
            .get("_meta")
            .and_then(|m| m.get(meta::TASK))
            .cloned();

        match (task_meta, tool.task_support) {
            (Some(task_meta), TaskSupport::Optional | TaskSupport::Required) => {
                let ttl = task_meta
                    .get("ttl")
                    .and_then(Value::as_u64)
                    .unwrap_or(60_000);
                let request_key = ctx.request_id.as_ref().map(RequestId::as_key);
                let task_id =
                    self.tasks
                        .submit(tool, arguments, ttl, ctx.session.clone(), request_key)?;
                Ok(json!({
                    "content": [],
                    "isError": false,
                    "_meta": { (meta::TASK): { "taskId": task_id, "status": "submitted" } },
                }))
            }
            (None, TaskSupport::Required) => Err(Error::validation(format!(
                "tool '{name}' requires task execution"
            ))),
            _ => {
                let handler = RequestContext::scope(ctx, tool.invoke_future(arguments)).boxed();
                let output = tool.enforce_timeout(handler, true).await?;
                Ok(wrap_tool_result(output))
            }
        }
    }

    fn handle_read_resource(&self, params: Value) -> McpResult<Value> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("missing resource uri"))?;

        if let Some(resource) = self.view.get_resource(uri) {
            let content = resource.read(&json!({}))?;
            return Ok(json!({ "contents": [content.to_wire(uri)] }));
        }

        if let Some((template, params)) = self.view.match_template(uri) {
            let extracted: Map<String, Value> =
                params.into_iter().map(|(k, v)| (k, json!(v))).collect();
            let content = template.read(&Value::Object(extracted))?;
            return Ok(json!({ "contents": [content.to_wire(uri)] }));
        }

        Err(Error::not_found(format!("Resource '{uri}'")))
    }

    fn handle_subscribe(&self, params: Value, subscribe: bool) -> McpResult<Value> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("missing resource uri"))?;
        if subscribe {
            let count = *self
                .subscriptions
                .entry(uri.to_string())
                .and_modify(|c| *c += 1)
                .or_insert(1);
            debug!(uri, count, "resource subscribed");
        } else if let Some(mut entry) = self.subscriptions.get_mut(uri) {
            let count = entry.value_mut();
            *count = count.saturating_sub(1);
            let emptied = *count == 0;
            drop(entry);
            if emptied {
                self.subscriptions.remove(uri);
            }
            debug!(uri, "resource unsubscribed");
        }
        Ok(json!({}))
    }

    fn handle_get_prompt(&self, params: Value) -> McpResult<Value> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("missing prompt name"))?;
        let prompt = self
            .view
            .get_prompt(name)
            .ok_or_else(|| Error::not_found(format!("Prompt '{name}'")))?;
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        for declared in &prompt.arguments {
            if declared.required && arguments.get(&declared.name).is_none() {
                return Err(Error::validation(format!(
                    "missing required prompt argument '{}'",
                    declared.name
                )));
            }
        }

        let messages = prompt.render(&arguments)?;
        let mut result = Map::new();
        if let Some(description) = &prompt.description {
            result.insert("description".to_string(), json!(description));
        }
        result.insert("messages".to_string(), json!(messages));
        Ok(Value::Object(result))
    }

    fn handle_complete(&self, params: Value) -> McpResult<Value> {
        let reference = params
            .get("ref")
            .ok_or_else(|| Error::validation("missing completion ref"))?;
        let ref_type = reference
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("missing completion ref.type"))?;
        let subject = match ref_type {
            "ref/prompt" => reference.get("name").and_then(Value::as_str),
            "ref/resource" => reference.get("uri").and_then(Value::as_str),
            other => {
                return Err(Error::validation(format!(
                    "unknown completion ref type '{other}'"
                )));
            }
        }
        .ok_or_else(|| Error::validation("missing completion ref target"))?;

        let argument = params.get("argument");
        let arg_name = argument
            .and_then(|a| a.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("");
        let arg_value = argument
            .and_then(|a| a.get("value"))
            .and_then(Value::as_str)
            .unwrap_or("");

        let values = self
            .completions
            .get(&format!("{ref_type}:{subject}"))
            .map(|provider| provider(arg_name, arg_value))
            .unwrap_or_default();
        let total = values.len();

        Ok(json!({
            "completion": {
                "values": values,
                "total": total,
                "hasMore": false,
            }
        }))
    }

    fn handle_set_level(&self, params: Value) -> McpResult<Value> {
        let level = params
            .get("level")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("missing log level"))?;
        *self.log_level.lock() = level.to_string();
        Ok(json!({}))
    }

    fn handle_task_get(&self, params: Value) -> McpResult<Value> {
        let task_id = params
            .get("taskId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("missing taskId"))?;
        let task = self
            .tasks
            .status(task_id)
            .ok_or_else(|| Error::not_found(format!("Task '{task_id}'")))?;
        Ok(serde_json::to_value(task)?)
    }

    fn handle_task_result(&self, params: Value) -> McpResult<Value> {
        let task_id = params
            .get("taskId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("missing taskId"))?;
        let result = self.tasks.result(task_id)?;
        Ok(wrap_tool_result(result))
    }

    fn handle_task_cancel(&self, params: Value) -> McpResult<Value> {
        let task_id = params
            .get("taskId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("missing taskId"))?;
        let reason = params
            .get("reason")
            .and_then(Value::as_str)
            .map(String::from);
        let task = self
            .tasks
            .cancel(task_id, reason)
            .ok_or_else(|| Error::not_found(format!("Task '{task_id}'")))?;
        Ok(serde_json::to_value(task)?)
    }
}

/// Validate tool call arguments against the tool's input schema (Draft 7)
fn validate_arguments(tool: &Tool, arguments: &Value) -> McpResult<()> {
    let schema = &tool.input_schema;
    let Some(schema_map) = schema.as_object() else {
        return Ok(());
    };
    if schema_map.is_empty() {
        return Ok(());
    }

    let validator = jsonschema::options()
        .with_draft(jsonschema::Draft::Draft7)
        .build(schema)
        .map_err(|e| {
            warn!(tool = %tool.name, error = %e, "input schema failed to compile");
            Error::internal(format!("invalid input schema for tool '{}'", tool.name))
        })?;

    let messages: Vec<String> = validator
        .iter_errors(arguments)
        .map(|e| format!("{}: {e}", e.instance_path))
        .collect();
    if messages.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "argument validation failed: {}",
            messages.join("; ")
        )))
    }
}

/// Shape a raw tool output into an MCP tool-call result
///
/// Outputs already carrying a `content` array pass through; everything else
/// becomes a single text content item. Bare numbers use their canonical JSON
/// rendering, so an integer 5 becomes `"5"`.
fn wrap_tool_result(output: Value) -> Value {
    if output
        .as_object()
        .is_some_and(|o| o.contains_key("content"))
    {
        let mut result = output;
        if let Some(map) = result.as_object_mut()
            && !map.contains_key("isError")
        {
            map.insert("isError".to_string(), json!(false));
        }
        return result;
    }

    let text = match &output {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    if output.is_string() {
        json!({
            "content": [{"type": "text", "text": text}],
            "isError": false,
        })
    } else {
        json!({
            "content": [{"type": "text", "text": text}],
            "structuredContent": { "result": output },
            "isError": false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wrap_formats_numbers_canonically() {
        let wrapped = wrap_tool_result(json!(5));
        assert_eq!(wrapped["content"][0]["text"], json!("5"));
        assert_eq!(wrapped["structuredContent"]["result"], json!(5));
        assert_eq!(wrapped["isError"], json!(false));
    }

    #[test]
    fn wrap_passes_content_shapes_through() {
        let shaped = json!({"content": [{"type": "text", "text": "done"}]});
        let wrapped = wrap_tool_result(shaped);
        assert_eq!(wrapped["content"][0]["text"], json!("done"));
        assert_eq!(wrapped["isError"], json!(false));

        let flagged = json!({"content": [], "isError": true});
        assert_eq!(wrap_tool_result(flagged)["isError"], json!(true));
    }

    #[test]
    fn wrap_strings_have_no_structured_content() {
        let wrapped = wrap_tool_result(json!("hello"));
        assert_eq!(wrapped["content"][0]["text"], json!("hello"));
        assert!(wrapped.get("structuredContent").is_none());
    }
}
