//! Per-tool argument and metadata transformation
//!
//! An [`ArgTransform`] renames, re-describes, defaults, hides, or re-types a
//! single argument. [`ToolTransformConfig::apply`] derives a new tool whose
//! handler reconstructs the parent's argument map (hidden defaults first,
//! then reverse-renamed visible arguments) before delegating.

use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use rapidmcp_protocol::{Error, McpResult, Tool, ToolFn};

use super::Transform;

/// Configuration for transforming a single argument
#[derive(Debug, Clone, Default)]
pub struct ArgTransform {
    /// New name for the argument
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// Default value, substituted when the caller omits the argument
    pub default: Option<Value>,
    /// Hide the argument from clients (requires a default)
    pub hide: bool,
    /// Override the required flag
    pub required: Option<bool>,
    /// Schema fragment merged over the parent's property schema
    pub schema: Option<Value>,
}

impl ArgTransform {
    /// Rename the argument
    #[must_use]
    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the description
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Supply a default value
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Hide the argument (a default must also be supplied)
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hide = true;
        self
    }

    /// Override the required flag
    #[must_use]
    pub fn require(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    /// Merge a schema fragment over the parent property
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    fn validate(&self) -> McpResult<()> {
        if self.hide && self.required == Some(true) {
            return Err(Error::validation("cannot hide a required argument"));
        }
        if self.hide && self.default.is_none() {
            return Err(Error::validation("hidden argument must have a default value"));
        }
        Ok(())
    }
}

struct SchemaTransform {
    schema: Value,
    /// new name -> parent name
    arg_mapping: HashMap<String, String>,
    /// parent name -> default for hidden arguments
    hidden_defaults: HashMap<String, Value>,
}

fn build_transformed_schema(
    parent_schema: &Value,
    transforms: &HashMap<String, ArgTransform>,
) -> SchemaTransform {
    let properties = parent_schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let required: Vec<String> = parent_schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| {
            r.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let mut new_properties = Map::new();
    let mut new_required = Vec::new();
    let mut arg_mapping = HashMap::new();
    let mut hidden_defaults = HashMap::new();

    for (parent_name, parent_prop) in &properties {
        let Some(transform) = transforms.get(parent_name) else {
            arg_mapping.insert(parent_name.clone(), parent_name.clone());
            new_properties.insert(parent_name.clone(), parent_prop.clone());
            if required.contains(parent_name) {
                new_required.push(parent_name.clone());
            }
            continue;
        };

        if transform.hide {
            // validate() guarantees a default exists
            if let Some(default) = &transform.default {
                hidden_defaults.insert(parent_name.clone(), default.clone());
            }
            continue;
        }

        let new_name = transform.name.clone().unwrap_or_else(|| parent_name.clone());
        arg_mapping.insert(new_name.clone(), parent_name.clone());

        let mut prop = parent_prop
            .as_object()
            .cloned()
            .unwrap_or_default();
        if let Some(description) = &transform.description {
            prop.insert("description".into(), json!(description));
        }
        if let Some(fragment) = transform.schema.as_ref().and_then(Value::as_object) {
            for (key, value) in fragment {
                prop.insert(key.clone(), value.clone());
            }
        }
        if let Some(default) = &transform.default {
            prop.insert("default".into(), default.clone());
        }
        new_properties.insert(new_name.clone(), Value::Object(prop));

        let was_required = required.contains(parent_name);
        let mut is_required = transform.required.unwrap_or(was_required);
        if transform.default.is_some() && transform.required.is_none() {
            is_required = false;
        }
        if is_required {
            new_required.push(new_name);
        }
    }

    let mut schema = parent_schema.as_object().cloned().unwrap_or_default();
    schema.insert("properties".into(), Value::Object(new_properties));
    schema.insert("required".into(), json!(new_required));

    SchemaTransform {
        schema: Value::Object(schema),
        arg_mapping,
        hidden_defaults,
    }
}

fn map_args_to_parent(
    args: &Value,
    arg_mapping: &HashMap<String, String>,
    hidden_defaults: &HashMap<String, Value>,
) -> Value {
    let mut parent_args = Map::new();
    for (parent_name, default) in hidden_defaults {
        parent_args.insert(parent_name.clone(), default.clone());
    }
    if let Some(map) = args.as_object() {
        for (new_name, value) in map {
            if let Some(parent_name) = arg_mapping.get(new_name) {
                parent_args.insert(parent_name.clone(), value.clone());
            }
        }
    }
    Value::Object(parent_args)
}

/// Declarative transform for one tool
#[derive(Debug, Clone, Default)]
pub struct ToolTransformConfig {
    /// New tool name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// Per-argument transforms keyed by the parent argument name
    pub arguments: HashMap<String, ArgTransform>,
}

impl ToolTransformConfig {
    /// Config that renames the tool
    pub fn renamed(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Override the description
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add an argument transform
    #[must_use]
    pub fn arg(mut self, parent_name: impl Into<String>, transform: ArgTransform) -> Self {
        self.arguments.insert(parent_name.into(), transform);
        self
    }

    /// Derive a new tool from `parent` with this configuration applied
    pub fn apply(&self, parent: &Tool) -> McpResult<Tool> {
        for transform in self.arguments.values() {
            transform.validate()?;
        }

        let transformed = build_transformed_schema(&parent.input_schema, &self.arguments);
        let arg_mapping = transformed.arg_mapping;
        let hidden_defaults = transformed.hidden_defaults;

        let parent_fn = parent.handler();
        let handler: ToolFn = Arc::new(move |args| {
            let parent_args = map_args_to_parent(&args, &arg_mapping, &hidden_defaults);
            parent_fn(parent_args)
        });

        let mut tool = Tool::with_handler(
            self.name.clone().unwrap_or_else(|| parent.name.clone()),
            transformed.schema,
            handler,
        );
        tool.title = parent.title.clone();
        tool.description = self
            .description
            .clone()
            .or_else(|| parent.description.clone());
        tool.output_schema = parent.output_schema.clone();
        tool.icons = parent.icons.clone();
        tool.timeout = parent.timeout;
        tool.task_support = parent.task_support;
        Ok(tool)
    }
}

/// Transform that applies [`ToolTransformConfig`]s to the tool view
#[derive(Debug, Default)]
pub struct ToolTransform {
    configs: HashMap<String, ToolTransformConfig>,
}

impl ToolTransform {
    /// Build from configs keyed by parent tool name, validating each transform
    pub fn new(configs: HashMap<String, ToolTransformConfig>) -> McpResult<Self> {
        for config in configs.values() {
            for transform in config.arguments.values() {
                transform.validate()?;
            }
        }
        Ok(Self { configs })
    }

    fn visible_name(&self, parent_name: &str) -> String {
        self.configs
            .get(parent_name)
            .and_then(|c| c.name.clone())
            .unwrap_or_else(|| parent_name.to_string())
    }
}

impl Transform for ToolTransform {
    fn list_tools(&self, call_next: &dyn Fn() -> Vec<Arc<Tool>>) -> Vec<Arc<Tool>> {
        call_next()
            .into_iter()
            .map(|tool| match self.configs.get(&tool.name) {
                Some(config) => match config.apply(&tool) {
                    Ok(transformed) => Arc::new(transformed),
                    Err(e) => {
                        tracing::warn!(tool = %tool.name, error = %e, "tool transform failed, exposing original");
                        tool
                    }
                },
                None => tool,
            })
            .collect()
    }

    fn get_tool(
        &self,
        name: &str,
        call_next: &dyn Fn(&str) -> Option<Arc<Tool>>,
    ) -> Option<Arc<Tool>> {
        // Resolve the visible name back to the parent it was derived from.
        let parent_name = self
            .configs
            .iter()
            .find(|(parent, _)| self.visible_name(parent) == name)
            .map(|(parent, _)| parent.clone());

        match parent_name {
            Some(parent_name) => {
                let parent = call_next(&parent_name)?;
                let config = self.configs.get(&parent_name)?;
                config.apply(&parent).ok().map(Arc::new)
            }
            None => {
                // A renamed tool's original name is no longer visible.
                if self
                    .configs
                    .get(name)
                    .is_some_and(|c| c.name.as_deref() != Some(name) && c.name.is_some())
                {
                    return None;
                }
                call_next(name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parent_tool() -> Tool {
        Tool::new(
            "search",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "api_key": {"type": "string"},
                    "limit": {"type": "integer"},
                },
                "required": ["query", "api_key"],
            }),
            |args| Ok(json!({ "received": args })),
        )
    }

    #[test]
    fn hidden_argument_requires_default() {
        let err = ToolTransformConfig::default()
            .arg("api_key", ArgTransform::default().hidden())
            .apply(&parent_tool())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn hidden_and_required_is_rejected() {
        let err = ToolTransformConfig::default()
            .arg(
                "api_key",
                ArgTransform::default()
                    .hidden()
                    .with_default(json!("k"))
                    .require(true),
            )
            .apply(&parent_tool())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn hidden_default_and_rename_reach_the_parent() {
        let config = ToolTransformConfig::renamed("find")
            .describe("Find things")
            .arg("api_key", ArgTransform::default().hidden().with_default(json!("secret")))
            .arg("query", ArgTransform::default().rename("q"));

        let tool = config.apply(&parent_tool()).unwrap();
        assert_eq!(tool.name, "find");
        assert_eq!(tool.description.as_deref(), Some("Find things"));

        // Schema hides api_key, renames query -> q, keeps limit.
        let props = tool.input_schema["properties"].as_object().unwrap();
        assert!(props.contains_key("q"));
        assert!(props.contains_key("limit"));
        assert!(!props.contains_key("api_key"));
        assert!(!props.contains_key("query"));
        let required = tool.input_schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("q")));
        assert!(!required.contains(&json!("api_key")));

        let out = tool.invoke(json!({"q": "rust", "limit": 3})).await.unwrap();
        assert_eq!(
            out["received"],
            json!({"api_key": "secret", "query": "rust", "limit": 3})
        );
    }

    #[test]
    fn default_without_required_override_makes_optional() {
        let config = ToolTransformConfig::default()
            .arg("query", ArgTransform::default().with_default(json!("*")));
        let tool = config.apply(&parent_tool()).unwrap();
        let required = tool.input_schema["required"].as_array().unwrap();
        assert!(!required.contains(&json!("query")));
        assert_eq!(tool.input_schema["properties"]["query"]["default"], json!("*"));
    }

    #[test]
    fn transform_view_renames_and_hides_original_name() {
        let mut configs = HashMap::new();
        configs.insert("search".to_string(), ToolTransformConfig::renamed("find"));
        let transform = ToolTransform::new(configs).unwrap();

        let base = parent_tool();
        let next_list = || vec![Arc::new(base.clone())];
        let names: Vec<_> = transform
            .list_tools(&next_list)
            .iter()
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(names, vec!["find"]);

        let base_for_get = parent_tool();
        let next_get = move |n: &str| (n == "search").then(|| Arc::new(base_for_get.clone()));
        assert!(transform.get_tool("find", &next_get).is_some());
        assert!(transform.get_tool("search", &next_get).is_none());
    }
}
