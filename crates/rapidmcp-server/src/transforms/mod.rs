//! Registry transforms: chain-of-responsibility wrappers over component views
//!
//! A [`Transform`] rewrites the view of tools/resources/prompts without
//! touching the underlying registries. Each hook receives a `call_next`
//! closure over the inner view; the [`TransformChain`] folds the base
//! registries through the registered transforms, with later-added
//! transforms wrapping earlier ones.

mod injection;
mod namespace;
mod tool_transform;

pub use injection::{PromptsAsTools, ResourcesAsTools};
pub use namespace::Namespace;
pub use tool_transform::{ArgTransform, ToolTransform, ToolTransformConfig};

use std::sync::Arc;

use rapidmcp_protocol::{Prompt, Resource, ResourceTemplate, Tool};

use crate::registry::{PromptRegistry, ResourceRegistry, TemplateRegistry, ToolRegistry};

/// A view transform over the component registries
///
/// Default implementations pass through to `call_next`, so a transform only
/// overrides the hooks it cares about.
pub trait Transform: Send + Sync {
    /// Transform the tool listing
    fn list_tools(&self, call_next: &dyn Fn() -> Vec<Arc<Tool>>) -> Vec<Arc<Tool>> {
        call_next()
    }

    /// Transform a tool lookup
    fn get_tool(
        &self,
        name: &str,
        call_next: &dyn Fn(&str) -> Option<Arc<Tool>>,
    ) -> Option<Arc<Tool>> {
        call_next(name)
    }

    /// Transform the resource listing
    fn list_resources(&self, call_next: &dyn Fn() -> Vec<Arc<Resource>>) -> Vec<Arc<Resource>> {
        call_next()
    }

    /// Transform a resource lookup
    fn get_resource(
        &self,
        uri: &str,
        call_next: &dyn Fn(&str) -> Option<Arc<Resource>>,
    ) -> Option<Arc<Resource>> {
        call_next(uri)
    }

    /// Transform the resource template listing
    fn list_templates(
        &self,
        call_next: &dyn Fn() -> Vec<Arc<ResourceTemplate>>,
    ) -> Vec<Arc<ResourceTemplate>> {
        call_next()
    }

    /// Transform the prompt listing
    fn list_prompts(&self, call_next: &dyn Fn() -> Vec<Arc<Prompt>>) -> Vec<Arc<Prompt>> {
        call_next()
    }

    /// Transform a prompt lookup
    fn get_prompt(
        &self,
        name: &str,
        call_next: &dyn Fn(&str) -> Option<Arc<Prompt>>,
    ) -> Option<Arc<Prompt>> {
        call_next(name)
    }
}

/// Shared handles to the four component registries
#[derive(Debug, Clone, Default)]
pub struct RegistryView {
    /// Tool registry
    pub tools: Arc<ToolRegistry>,
    /// Resource registry
    pub resources: Arc<ResourceRegistry>,
    /// Resource template registry
    pub templates: Arc<TemplateRegistry>,
    /// Prompt registry
    pub prompts: Arc<PromptRegistry>,
}

/// The registries folded through a flat transform chain
#[derive(Clone)]
pub struct TransformChain {
    view: RegistryView,
    transforms: Vec<Arc<dyn Transform>>,
}

impl std::fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformChain")
            .field("transforms", &self.transforms.len())
            .finish()
    }
}

impl TransformChain {
    /// Build a chain over registries with transforms (later entries wrap earlier ones)
    pub fn new(view: RegistryView, transforms: Vec<Arc<dyn Transform>>) -> Self {
        Self { view, transforms }
    }

    /// The untransformed registries
    pub fn base(&self) -> &RegistryView {
        &self.view
    }

    /// Tools as seen through the chain
    pub fn list_tools(&self) -> Vec<Arc<Tool>> {
        fn walk(
            transforms: &[Arc<dyn Transform>],
            base: &dyn Fn() -> Vec<Arc<Tool>>,
        ) -> Vec<Arc<Tool>> {
            match transforms.split_last() {
                None => base(),
                Some((outer, rest)) => outer.list_tools(&|| walk(rest, base)),
            }
        }
        walk(&self.transforms, &|| self.view.tools.list())
    }

    /// Tool lookup through the chain
    pub fn get_tool(&self, name: &str) -> Option<Arc<Tool>> {
        fn walk(
            transforms: &[Arc<dyn Transform>],
            name: &str,
            base: &dyn Fn(&str) -> Option<Arc<Tool>>,
        ) -> Option<Arc<Tool>> {
            match transforms.split_last() {
                None => base(name),
                Some((outer, rest)) => outer.get_tool(name, &|n: &str| walk(rest, n, base)),
            }
        }
        walk(&self.transforms, name, &|n| self.view.tools.get(n))
    }

    /// Resources as seen through the chain
    pub fn list_resources(&self) -> Vec<Arc<Resource>> {
        fn walk(
            transforms: &[Arc<dyn Transform>],
            base: &dyn Fn() -> Vec<Arc<Resource>>,
        ) -> Vec<Arc<Resource>> {
            match transforms.split_last() {
                None => base(),
                Some((outer, rest)) => outer.list_resources(&|| walk(rest, base)),
            }
        }
        walk(&self.transforms, &|| self.view.resources.list())
    }

    /// Resource lookup through the chain
    pub fn get_resource(&self, uri: &str) -> Option<Arc<Resource>> {
        fn walk(
            transforms: &[Arc<dyn Transform>],
            uri: &str,
            base: &dyn Fn(&str) -> Option<Arc<Resource>>,
        ) -> Option<Arc<Resource>> {
            match transforms.split_last() {
                None => base(uri),
                Some((outer, rest)) => outer.get_resource(uri, &|u: &str| walk(rest, u, base)),
            }
        }
        walk(&self.transforms, uri, &|u| self.view.resources.get(u))
    }

    /// Resource templates as seen through the chain
    pub fn list_templates(&self) -> Vec<Arc<ResourceTemplate>> {
        fn walk(
            transforms: &[Arc<dyn Transform>],
            base: &dyn Fn() -> Vec<Arc<ResourceTemplate>>,
        ) -> Vec<Arc<ResourceTemplate>> {
            match transforms.split_last() {
                None => base(),
                Some((outer, rest)) => outer.list_templates(&|| walk(rest, base)),
            }
        }
        walk(&self.transforms, &|| self.view.templates.list())
    }

    /// Match a URI against templates as seen through the chain, first match wins
    pub fn match_template(&self, uri: &str) -> Option<(Arc<ResourceTemplate>, Vec<(String, String)>)> {
        self.list_templates()
            .into_iter()
            .find_map(|t| t.match_uri(uri).map(|params| (t, params)))
    }

    /// Prompts as seen through the chain
    pub fn list_prompts(&self) -> Vec<Arc<Prompt>> {
        fn walk(
            transforms: &[Arc<dyn Transform>],
            base: &dyn Fn() -> Vec<Arc<Prompt>>,
        ) -> Vec<Arc<Prompt>> {
            match transforms.split_last() {
                None => base(),
                Some((outer, rest)) => outer.list_prompts(&|| walk(rest, base)),
            }
        }
        walk(&self.transforms, &|| self.view.prompts.list())
    }

    /// Prompt lookup through the chain
    pub fn get_prompt(&self, name: &str) -> Option<Arc<Prompt>> {
        fn walk(
            transforms: &[Arc<dyn Transform>],
            name: &str,
            base: &dyn Fn(&str) -> Option<Arc<Prompt>>,
        ) -> Option<Arc<Prompt>> {
            match transforms.split_last() {
                None => base(name),
                Some((outer, rest)) => outer.get_prompt(name, &|n: &str| walk(rest, n, base)),
            }
        }
        walk(&self.transforms, name, &|n| self.view.prompts.get(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Suffix(&'static str);

    impl Transform for Suffix {
        fn list_tools(&self, call_next: &dyn Fn() -> Vec<Arc<Tool>>) -> Vec<Arc<Tool>> {
            call_next()
                .into_iter()
                .map(|t| {
                    let mut renamed = (*t).clone();
                    renamed.name = format!("{}{}", renamed.name, self.0);
                    Arc::new(renamed)
                })
                .collect()
        }
    }

    #[test]
    fn later_transforms_wrap_earlier_ones() {
        let view = RegistryView::default();
        view.tools
            .register(Tool::new("base", json!({}), Ok))
            .unwrap();

        let chain = TransformChain::new(
            view,
            vec![Arc::new(Suffix("_a")), Arc::new(Suffix("_b"))],
        );
        let names: Vec<_> = chain.list_tools().iter().map(|t| t.name.clone()).collect();
        // Suffix("_b") is outermost, so it sees "_a" already applied.
        assert_eq!(names, vec!["base_a_b"]);
    }

    #[test]
    fn empty_chain_is_transparent() {
        let view = RegistryView::default();
        view.tools
            .register(Tool::new("plain", json!({}), Ok))
            .unwrap();
        let chain = TransformChain::new(view, Vec::new());
        assert!(chain.get_tool("plain").is_some());
        assert!(chain.get_tool("missing").is_none());
    }
}
