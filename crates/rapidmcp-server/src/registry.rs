//! Keyed component registries for tools, resources, templates, and prompts
//!
//! Registration order is load-bearing: list results page in insertion order
//! and template matching is first-registered-wins. Registries are populated
//! at setup and read-only on the hot path, so a plain `RwLock<Vec<_>>` keeps
//! both the order and the lookups cheap.

use parking_lot::RwLock;
use std::sync::Arc;

use rapidmcp_protocol::{Error, McpResult, Prompt, Resource, ResourceTemplate, Tool};

/// Tools keyed by name
#[derive(Debug, Default)]
pub struct ToolRegistry {
    inner: RwLock<Vec<Arc<Tool>>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; duplicate names are rejected
    pub fn register(&self, tool: Tool) -> McpResult<()> {
        let mut tools = self.inner.write();
        if tools.iter().any(|t| t.name == tool.name) {
            return Err(Error::validation(format!(
                "tool '{}' is already registered",
                tool.name
            )));
        }
        tools.push(Arc::new(tool));
        Ok(())
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<Tool>> {
        self.inner.read().iter().find(|t| t.name == name).cloned()
    }

    /// All tools in registration order
    pub fn list(&self) -> Vec<Arc<Tool>> {
        self.inner.read().clone()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Resources keyed by URI
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    inner: RwLock<Vec<Arc<Resource>>>,
}

impl ResourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource; duplicate URIs are rejected
    pub fn register(&self, resource: Resource) -> McpResult<()> {
        let mut resources = self.inner.write();
        if resources.iter().any(|r| r.uri == resource.uri) {
            return Err(Error::validation(format!(
                "resource '{}' is already registered",
                resource.uri
            )));
        }
        resources.push(Arc::new(resource));
        Ok(())
    }

    /// Look up a resource by exact URI
    pub fn get(&self, uri: &str) -> Option<Arc<Resource>> {
        self.inner.read().iter().find(|r| r.uri == uri).cloned()
    }

    /// All resources in registration order
    pub fn list(&self) -> Vec<Arc<Resource>> {
        self.inner.read().clone()
    }

    /// Number of registered resources
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Resource templates in registration order
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    inner: RwLock<Vec<Arc<ResourceTemplate>>>,
}

impl TemplateRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template; duplicate patterns are rejected, overlapping
    /// patterns are permitted (first match wins)
    pub fn register(&self, template: ResourceTemplate) -> McpResult<()> {
        let mut templates = self.inner.write();
        if templates
            .iter()
            .any(|t| t.uri_template.template() == template.uri_template.template())
        {
            return Err(Error::validation(format!(
                "resource template '{}' is already registered",
                template.uri_template.template()
            )));
        }
        templates.push(Arc::new(template));
        Ok(())
    }

    /// All templates in registration order
    pub fn list(&self) -> Vec<Arc<ResourceTemplate>> {
        self.inner.read().clone()
    }

    /// Match a URI against registered templates, first match wins
    pub fn match_uri(&self, uri: &str) -> Option<(Arc<ResourceTemplate>, Vec<(String, String)>)> {
        let templates = self.inner.read();
        for template in templates.iter() {
            if let Some(params) = template.match_uri(uri) {
                return Some((Arc::clone(template), params));
            }
        }
        None
    }

    /// Number of registered templates
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Prompts keyed by name
#[derive(Debug, Default)]
pub struct PromptRegistry {
    inner: RwLock<Vec<Arc<Prompt>>>,
}

impl PromptRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prompt; duplicate names are rejected
    pub fn register(&self, prompt: Prompt) -> McpResult<()> {
        let mut prompts = self.inner.write();
        if prompts.iter().any(|p| p.name == prompt.name) {
            return Err(Error::validation(format!(
                "prompt '{}' is already registered",
                prompt.name
            )));
        }
        prompts.push(Arc::new(prompt));
        Ok(())
    }

    /// Look up a prompt by name
    pub fn get(&self, name: &str) -> Option<Arc<Prompt>> {
        self.inner.read().iter().find(|p| p.name == name).cloned()
    }

    /// All prompts in registration order
    pub fn list(&self) -> Vec<Arc<Prompt>> {
        self.inner.read().clone()
    }

    /// Number of registered prompts
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapidmcp_protocol::ResourceContent;
    use serde_json::json;

    #[test]
    fn duplicate_tool_names_are_rejected() {
        let registry = ToolRegistry::new();
        registry
            .register(Tool::new("echo", json!({}), Ok))
            .unwrap();
        let err = registry
            .register(Tool::new("echo", json!({}), Ok))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn tools_list_in_registration_order() {
        let registry = ToolRegistry::new();
        for name in ["t1", "t2", "t3"] {
            registry.register(Tool::new(name, json!({}), Ok)).unwrap();
        }
        let names: Vec<_> = registry.list().iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn template_first_match_wins_on_overlap() {
        let registry = TemplateRegistry::new();
        registry
            .register(
                ResourceTemplate::new("data://{key}", "first", |_| {
                    Ok(ResourceContent::text("first"))
                })
                .unwrap(),
            )
            .unwrap();
        registry
            .register(
                ResourceTemplate::new("data://{other*}", "second", |_| {
                    Ok(ResourceContent::text("second"))
                })
                .unwrap(),
            )
            .unwrap();

        let (template, params) = registry.match_uri("data://abc").unwrap();
        assert_eq!(template.name, "first");
        assert_eq!(params, vec![("key".to_string(), "abc".to_string())]);

        // Only the wildcard accepts slashes.
        let (template, _) = registry.match_uri("data://a/b").unwrap();
        assert_eq!(template.name, "second");
    }

    #[test]
    fn resource_lookup_is_exact() {
        let registry = ResourceRegistry::new();
        registry
            .register(Resource::new_static(
                "memo://a",
                "a",
                ResourceContent::text("x"),
            ))
            .unwrap();
        assert!(registry.get("memo://a").is_some());
        assert!(registry.get("memo://a/").is_none());
    }
}
