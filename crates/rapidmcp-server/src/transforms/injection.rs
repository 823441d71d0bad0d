//! Synthetic tool injection for tool-only clients
//!
//! [`PromptsAsTools`] exposes `list_prompts` / `get_prompt` and
//! [`ResourcesAsTools`] exposes `list_resources` / `read_resource` as
//! ordinary tools whose handlers delegate to the registries.

use serde_json::{Value, json};
use std::sync::Arc;

use rapidmcp_protocol::{Error, McpResult, ResourceBody, Tool};

use super::Transform;
use crate::registry::{PromptRegistry, ResourceRegistry, TemplateRegistry};

fn text_result(text: impl Into<String>) -> Value {
    json!({
        "content": [{"type": "text", "text": text.into()}],
        "isError": false,
    })
}

/// Injects `list_prompts` and `get_prompt` tools
#[derive(Debug, Clone)]
pub struct PromptsAsTools {
    prompts: Arc<PromptRegistry>,
}

impl PromptsAsTools {
    /// Wrap a prompt registry
    pub fn new(prompts: Arc<PromptRegistry>) -> Self {
        Self { prompts }
    }

    fn list_prompts_tool(&self) -> Arc<Tool> {
        let prompts = Arc::clone(&self.prompts);
        Arc::new(
            Tool::new(
                "list_prompts",
                json!({"type": "object", "properties": {}, "required": []}),
                move |_args| {
                    let entries: Vec<Value> = prompts
                        .list()
                        .iter()
                        .map(|p| {
                            let mut entry = p.to_definition();
                            if let (Some(map), Some(template)) =
                                (entry.as_object_mut(), p.template_string())
                            {
                                map.insert("template".into(), json!(template));
                            }
                            entry
                        })
                        .collect();
                    let listing = serde_json::to_string_pretty(&entries)?;
                    Ok(text_result(listing))
                },
            )
            .with_description("List available prompts and their arguments"),
        )
    }

    fn get_prompt_tool(&self) -> Arc<Tool> {
        let prompts = Arc::clone(&self.prompts);
        Arc::new(
            Tool::new(
                "get_prompt",
                json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "description": "The name of the prompt to render"},
                        "arguments": {"type": "object", "additionalProperties": true},
                    },
                    "required": ["name"],
                }),
                move |args| {
                    let name = args
                        .get("name")
                        .and_then(Value::as_str)
                        .ok_or_else(|| Error::validation("missing prompt name"))?;
                    let prompt = prompts
                        .get(name)
                        .ok_or_else(|| Error::not_found(format!("prompt '{name}'")))?;
                    let arguments = args.get("arguments").cloned().unwrap_or_else(|| json!({}));
                    let messages = prompt.render(&arguments)?;
                    let rendered = messages
                        .iter()
                        .filter_map(|m| m.content.get("text").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join("\n");
                    Ok(text_result(rendered))
                },
            )
            .with_description("Get a rendered prompt by name"),
        )
    }
}

impl Transform for PromptsAsTools {
    fn list_tools(&self, call_next: &dyn Fn() -> Vec<Arc<Tool>>) -> Vec<Arc<Tool>> {
        let mut tools = call_next();
        tools.push(self.list_prompts_tool());
        tools.push(self.get_prompt_tool());
        tools
    }

    fn get_tool(
        &self,
        name: &str,
        call_next: &dyn Fn(&str) -> Option<Arc<Tool>>,
    ) -> Option<Arc<Tool>> {
        match name {
            "list_prompts" => Some(self.list_prompts_tool()),
            "get_prompt" => Some(self.get_prompt_tool()),
            other => call_next(other),
        }
    }
}

/// Injects `list_resources` and `read_resource` tools
#[derive(Debug, Clone)]
pub struct ResourcesAsTools {
    resources: Arc<ResourceRegistry>,
    templates: Arc<TemplateRegistry>,
}

impl ResourcesAsTools {
    /// Wrap the resource and template registries
    pub fn new(resources: Arc<ResourceRegistry>, templates: Arc<TemplateRegistry>) -> Self {
        Self {
            resources,
            templates,
        }
    }

    fn list_resources_tool(&self) -> Arc<Tool> {
        let resources = Arc::clone(&self.resources);
        let templates = Arc::clone(&self.templates);
        Arc::new(
            Tool::new(
                "list_resources",
                json!({"type": "object", "properties": {}, "required": []}),
                move |_args| {
                    let mut entries: Vec<Value> = resources
                        .list()
                        .iter()
                        .map(|r| r.to_definition())
                        .collect();
                    entries.extend(templates.list().iter().map(|t| t.to_definition()));
                    let listing = serde_json::to_string_pretty(&entries)?;
                    Ok(text_result(listing))
                },
            )
            .with_description("List available resources and resource templates"),
        )
    }

    fn read_resource_tool(&self) -> Arc<Tool> {
        let resources = Arc::clone(&self.resources);
        let templates = Arc::clone(&self.templates);
        Arc::new(
            Tool::new(
                "read_resource",
                json!({
                    "type": "object",
                    "properties": {"uri": {"type": "string"}},
                    "required": ["uri"],
                }),
                move |args| {
                    let uri = args
                        .get("uri")
                        .and_then(Value::as_str)
                        .ok_or_else(|| Error::validation("missing resource URI"))?;

                    let content = read_by_uri(&resources, &templates, uri)?;
                    let text = match &content.body {
                        ResourceBody::Text(text) => text.clone(),
                        ResourceBody::Blob(_) => format!(
                            "[binary data: {}]",
                            content
                                .mime_type
                                .as_deref()
                                .unwrap_or("application/octet-stream")
                        ),
                    };
                    Ok(text_result(text))
                },
            )
            .with_description("Read a resource by URI"),
        )
    }
}

fn read_by_uri(
    resources: &ResourceRegistry,
    templates: &TemplateRegistry,
    uri: &str,
) -> McpResult<rapidmcp_protocol::ResourceContent> {
    if let Some(resource) = resources.get(uri) {
        return resource.read(&json!({}));
    }
    if let Some((template, params)) = templates.match_uri(uri) {
        let params: serde_json::Map<String, Value> = params
            .into_iter()
            .map(|(k, v)| (k, json!(v)))
            .collect();
        return template.read(&Value::Object(params));
    }
    Err(Error::not_found(format!("resource '{uri}'")))
}

impl Transform for ResourcesAsTools {
    fn list_tools(&self, call_next: &dyn Fn() -> Vec<Arc<Tool>>) -> Vec<Arc<Tool>> {
        let mut tools = call_next();
        tools.push(self.list_resources_tool());
        tools.push(self.read_resource_tool());
        tools
    }

    fn get_tool(
        &self,
        name: &str,
        call_next: &dyn Fn(&str) -> Option<Arc<Tool>>,
    ) -> Option<Arc<Tool>> {
        match name {
            "list_resources" => Some(self.list_resources_tool()),
            "read_resource" => Some(self.read_resource_tool()),
            other => call_next(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::{RegistryView, TransformChain};
    use pretty_assertions::assert_eq;
    use rapidmcp_protocol::{Prompt, Resource, ResourceContent};

    #[tokio::test]
    async fn prompts_become_callable_tools() {
        let view = RegistryView::default();
        view.prompts
            .register(
                Prompt::from_template("greeting", "Hello {name}!")
                    .with_argument("name", None, true),
            )
            .unwrap();
        let chain = TransformChain::new(
            view.clone(),
            vec![Arc::new(PromptsAsTools::new(Arc::clone(&view.prompts)))],
        );

        let names: Vec<_> = chain.list_tools().iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["list_prompts", "get_prompt"]);

        let get_prompt = chain.get_tool("get_prompt").unwrap();
        let out = get_prompt
            .invoke(json!({"name": "greeting", "arguments": {"name": "Ada"}}))
            .await
            .unwrap();
        assert_eq!(out["content"][0]["text"], json!("Hello Ada!"));
        assert_eq!(out["isError"], json!(false));
    }

    #[tokio::test]
    async fn resources_become_callable_tools() {
        let view = RegistryView::default();
        view.resources
            .register(Resource::new_static(
                "memo://today",
                "today",
                ResourceContent::text("ship it"),
            ))
            .unwrap();
        view.templates
            .register(
                rapidmcp_protocol::ResourceTemplate::new("memo://{day}", "by-day", |params| {
                    Ok(ResourceContent::text(format!(
                        "memo for {}",
                        params["day"].as_str().unwrap_or("?")
                    )))
                })
                .unwrap(),
            )
            .unwrap();

        let chain = TransformChain::new(
            view.clone(),
            vec![Arc::new(ResourcesAsTools::new(
                Arc::clone(&view.resources),
                Arc::clone(&view.templates),
            ))],
        );

        let read = chain.get_tool("read_resource").unwrap();
        let direct = read.invoke(json!({"uri": "memo://today"})).await.unwrap();
        assert_eq!(direct["content"][0]["text"], json!("ship it"));

        let templated = read.invoke(json!({"uri": "memo://friday"})).await.unwrap();
        assert_eq!(templated["content"][0]["text"], json!("memo for friday"));

        let missing = read.invoke(json!({"uri": "other://x"})).await;
        assert!(missing.is_err());
    }
}
