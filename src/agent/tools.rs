//! Tool registry
//!
//! Tools are declared up front: a name, a JSON argument schema, and an
//! invocation function. The dialogue engine resolves model tool requests
//! only against this fixed set.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Value, json};

use crate::{Error, Result};

/// Declared shape of a tool, advertised to the model
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments object
    pub parameters: Value,
}

/// Invocation function: JSON arguments in, result text out
type ToolFn = Box<dyn Fn(&Value) -> Result<String> + Send + Sync>;

struct RegisteredTool {
    definition: ToolDefinition,
    invoke: ToolFn,
}

/// Fixed set of tools resolved at dialogue-engine construction
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    /// Registration order, for stable definition listing
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in tools
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(
            ToolDefinition {
                name: "get_weather".to_string(),
                description: "Return the weather for a city".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "city": { "type": "string", "description": "City name" }
                    },
                    "required": ["city"]
                }),
            },
            |args| {
                let city = args
                    .get("city")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Tool("get_weather: missing city".to_string()))?;
                Ok(format!("It is sunny in {city}."))
            },
        );
        registry
    }

    /// Register a tool
    pub fn register<F>(&mut self, definition: ToolDefinition, invoke: F)
    where
        F: Fn(&Value) -> Result<String> + Send + Sync + 'static,
    {
        let name = definition.name.clone();
        self.tools.insert(
            name.clone(),
            RegisteredTool {
                definition,
                invoke: Box::new(invoke),
            },
        );
        self.order.push(name);
    }

    /// Definitions in registration order, for the backend request
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.definition.clone())
            .collect()
    }

    /// Whether any tools are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a tool by name with JSON-encoded arguments
    ///
    /// # Errors
    ///
    /// Returns error if the tool is unknown, the arguments are not valid
    /// JSON, or the tool itself fails
    pub fn invoke(&self, name: &str, arguments: &str) -> Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::Tool(format!("unknown tool: {name}")))?;

        let args: Value = if arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(arguments)
                .map_err(|e| Error::Tool(format!("{name}: malformed arguments: {e}")))?
        };

        (tool.invoke)(&args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_weather_tool() {
        let registry = ToolRegistry::with_builtins();
        let result = registry
            .invoke("get_weather", r#"{"city":"New York"}"#)
            .unwrap();
        assert_eq!(result, "It is sunny in New York.");
    }

    #[test]
    fn unknown_tool_is_an_error() {
        let registry = ToolRegistry::with_builtins();
        assert!(registry.invoke("launch_rocket", "{}").is_err());
    }

    #[test]
    fn malformed_arguments_are_an_error() {
        let registry = ToolRegistry::with_builtins();
        assert!(registry.invoke("get_weather", "{not json").is_err());
    }

    #[test]
    fn missing_required_argument_is_an_error() {
        let registry = ToolRegistry::with_builtins();
        assert!(registry.invoke("get_weather", "{}").is_err());
    }

    #[test]
    fn definitions_preserve_registration_order() {
        let mut registry = ToolRegistry::with_builtins();
        registry.register(
            ToolDefinition {
                name: "echo".to_string(),
                description: "Echo the input".to_string(),
                parameters: json!({"type": "object"}),
            },
            |args| Ok(args.to_string()),
        );

        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["get_weather", "echo"]);
    }
}
