//! Namespace transform: prefix tool/prompt names and resource URIs
//!
//! Tools and prompts get a `<prefix>_` name prefix; resources and templates
//! get `<prefix>/` spliced in after the URI scheme. Lookups reverse the
//! mapping and fall through to `None` for names outside the namespace.

use std::sync::Arc;
use tracing::warn;

use rapidmcp_protocol::{Prompt, Resource, ResourceTemplate, Tool};

use super::Transform;

/// Prefixing transform for mounted sub-servers
#[derive(Debug, Clone)]
pub struct Namespace {
    prefix: String,
    name_prefix: String,
}

impl Namespace {
    /// Create a namespace with the given prefix; an empty prefix is a no-op
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let name_prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}_")
        };
        Self {
            prefix,
            name_prefix,
        }
    }

    /// Apply the name prefix
    pub fn transform_name(&self, name: &str) -> String {
        format!("{}{name}", self.name_prefix)
    }

    /// Strip the name prefix; `None` when the name is outside this namespace
    pub fn reverse_name(&self, name: &str) -> Option<String> {
        if self.name_prefix.is_empty() {
            return Some(name.to_string());
        }
        name.strip_prefix(&self.name_prefix).map(String::from)
    }

    /// Insert `<prefix>/` after the URI scheme; URIs without a scheme pass through
    pub fn transform_uri(&self, uri: &str) -> String {
        if self.prefix.is_empty() {
            return uri.to_string();
        }
        match uri.split_once("://") {
            Some((scheme, path)) => format!("{scheme}://{}/{path}", self.prefix),
            None => uri.to_string(),
        }
    }

    /// Strip `<prefix>/` after the scheme; `None` when outside this namespace
    pub fn reverse_uri(&self, uri: &str) -> Option<String> {
        if self.prefix.is_empty() {
            return Some(uri.to_string());
        }
        let (scheme, path) = uri.split_once("://")?;
        let stripped = path.strip_prefix(&format!("{}/", self.prefix))?;
        Some(format!("{scheme}://{stripped}"))
    }

    fn rename_tool(&self, tool: &Tool) -> Arc<Tool> {
        let mut renamed = tool.clone();
        renamed.name = self.transform_name(&tool.name);
        Arc::new(renamed)
    }
}

impl Transform for Namespace {
    fn list_tools(&self, call_next: &dyn Fn() -> Vec<Arc<Tool>>) -> Vec<Arc<Tool>> {
        call_next().iter().map(|t| self.rename_tool(t)).collect()
    }

    fn get_tool(
        &self,
        name: &str,
        call_next: &dyn Fn(&str) -> Option<Arc<Tool>>,
    ) -> Option<Arc<Tool>> {
        let original = self.reverse_name(name)?;
        call_next(&original).map(|t| self.rename_tool(&t))
    }

    fn list_resources(&self, call_next: &dyn Fn() -> Vec<Arc<Resource>>) -> Vec<Arc<Resource>> {
        call_next()
            .iter()
            .map(|r| Arc::new((**r).clone().with_uri(self.transform_uri(&r.uri))))
            .collect()
    }

    fn get_resource(
        &self,
        uri: &str,
        call_next: &dyn Fn(&str) -> Option<Arc<Resource>>,
    ) -> Option<Arc<Resource>> {
        let original = self.reverse_uri(uri)?;
        call_next(&original).map(|r| Arc::new((*r).clone().with_uri(uri)))
    }

    fn list_templates(
        &self,
        call_next: &dyn Fn() -> Vec<Arc<ResourceTemplate>>,
    ) -> Vec<Arc<ResourceTemplate>> {
        call_next()
            .iter()
            .filter_map(|t| {
                let pattern = self.transform_uri(t.uri_template.template());
                match t.with_uri_template(&pattern) {
                    Ok(namespaced) => Some(Arc::new(namespaced)),
                    Err(e) => {
                        warn!(template = %t.uri_template.template(), error = %e, "template dropped from namespaced view");
                        None
                    }
                }
            })
            .collect()
    }

    fn list_prompts(&self, call_next: &dyn Fn() -> Vec<Arc<Prompt>>) -> Vec<Arc<Prompt>> {
        call_next()
            .iter()
            .map(|p| Arc::new((**p).clone().with_name(self.transform_name(&p.name))))
            .collect()
    }

    fn get_prompt(
        &self,
        name: &str,
        call_next: &dyn Fn(&str) -> Option<Arc<Prompt>>,
    ) -> Option<Arc<Prompt>> {
        let original = self.reverse_name(name)?;
        call_next(&original).map(|p| Arc::new((*p).clone().with_name(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::{RegistryView, TransformChain};
    use pretty_assertions::assert_eq;
    use rapidmcp_protocol::ResourceContent;
    use serde_json::json;

    #[test]
    fn name_round_trip() {
        let ns = Namespace::new("weather");
        for name in ["forecast", "get_current", "a"] {
            let transformed = ns.transform_name(name);
            assert_eq!(transformed, format!("weather_{name}"));
            assert_eq!(ns.reverse_name(&transformed).as_deref(), Some(name));
        }
        assert!(ns.reverse_name("other_tool").is_none());
    }

    #[test]
    fn uri_round_trip_preserves_scheme() {
        let ns = Namespace::new("eu");
        let transformed = ns.transform_uri("weather://london/current");
        assert_eq!(transformed, "weather://eu/london/current");
        assert_eq!(
            ns.reverse_uri(&transformed).as_deref(),
            Some("weather://london/current")
        );
        assert!(ns.reverse_uri("weather://us/london/current").is_none());
        assert!(ns.reverse_uri("no-scheme-here").is_none());
    }

    #[test]
    fn empty_prefix_is_identity() {
        let ns = Namespace::new("");
        assert_eq!(ns.transform_name("x"), "x");
        assert_eq!(ns.reverse_name("x").as_deref(), Some("x"));
        assert_eq!(ns.transform_uri("a://b"), "a://b");
    }

    #[tokio::test]
    async fn namespaced_tool_still_invokes_parent() {
        let view = RegistryView::default();
        view.tools
            .register(Tool::new("add", json!({"type":"object"}), |input| {
                Ok(json!(
                    input["a"].as_i64().unwrap_or(0) + input["b"].as_i64().unwrap_or(0)
                ))
            }))
            .unwrap();
        let chain = TransformChain::new(view, vec![std::sync::Arc::new(Namespace::new("math"))]);

        assert!(chain.get_tool("add").is_none());
        let tool = chain.get_tool("math_add").expect("namespaced name resolves");
        assert_eq!(tool.name, "math_add");
        let out = tool.invoke(json!({"a": 2, "b": 3})).await.unwrap();
        assert_eq!(out, json!(5));
    }

    #[test]
    fn templates_are_renamespaced_and_match() {
        let view = RegistryView::default();
        view.templates
            .register(
                ResourceTemplate::new("weather://{city}/current", "weather", |params| {
                    Ok(ResourceContent::text(format!(
                        "weather for {}",
                        params["city"].as_str().unwrap_or("?")
                    )))
                })
                .unwrap(),
            )
            .unwrap();
        let chain = TransformChain::new(view, vec![std::sync::Arc::new(Namespace::new("eu"))]);

        let (template, params) = chain
            .match_template("weather://eu/london/current")
            .expect("namespaced URI matches");
        assert_eq!(template.uri_template.template(), "weather://eu/{city}/current");
        assert_eq!(params, vec![("city".to_string(), "london".to_string())]);
    }
}
