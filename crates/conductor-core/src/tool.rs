use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cancellation::CancellationToken;

/// A single parameter's type tag. Kept deliberately small -- the engine
/// never inspects this, only agents consulting the registry at runtime do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub param_type: ParameterType,
    pub required: bool,
    pub description: String,
}

/// An ordered name -> descriptor mapping, preserving declaration order for
/// tools that render their schema (e.g. for a prompt or a CLI `--help`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterSchema(Vec<(String, ParameterDescriptor)>);

impl ParameterSchema {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_param(mut self, name: impl Into<String>, descriptor: ParameterDescriptor) -> Self {
        self.0.push((name.into(), descriptor));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, ParameterDescriptor)> {
        self.0.iter()
    }

    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, d)| d.required)
            .map(|(n, _)| n.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A named, schema-validated callable used inside an agent. Opaque to the
/// workflow engine: nothing in `conductor-engine` calls this trait.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameter_schema(&self) -> &ParameterSchema;

    /// Checks that every required parameter is present. Tools needing
    /// stricter type checking override this.
    fn validate_parameters(&self, params: &HashMap<String, Value>) -> bool {
        self.parameter_schema()
            .required_names()
            .all(|name| params.contains_key(name))
    }

    async fn execute(&self, params: HashMap<String, Value>, cancel: CancellationToken) -> ToolResult;
}

pub type ToolRef = Arc<dyn Tool>;
pub type ToolFactory = Arc<dyn Fn() -> ToolRef + Send + Sync>;

enum Binding {
    Instance(ToolRef),
    Factory(ToolFactory),
}

/// Thread-safe name -> tool mapping. Duplicate registrations replace the
/// prior binding. Lazily-registered factories are instantiated on first
/// lookup and then cached, matching the "register by type descriptor"
/// contract.
#[derive(Default)]
pub struct ToolRegistry {
    bindings: RwLock<HashMap<String, Binding>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, tool: ToolRef) {
        self.bindings
            .write()
            .insert(tool.name().to_string(), Binding::Instance(tool));
    }

    pub fn register_factory(&self, name: impl Into<String>, factory: ToolFactory) {
        self.bindings
            .write()
            .insert(name.into(), Binding::Factory(factory));
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.bindings.write().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<ToolRef> {
        {
            let bindings = self.bindings.read();
            if let Some(Binding::Instance(tool)) = bindings.get(name) {
                return Some(tool.clone());
            }
        }
        let mut bindings = self.bindings.write();
        match bindings.get(name) {
            Some(Binding::Instance(tool)) => Some(tool.clone()),
            Some(Binding::Factory(factory)) => {
                let tool = factory();
                bindings.insert(name.to_string(), Binding::Instance(tool.clone()));
                Some(tool)
            }
            None => None,
        }
    }

    pub fn list(&self) -> Vec<String> {
        self.bindings.read().keys().cloned().collect()
    }

    /// Instantiate and register each candidate, collecting failures instead
    /// of aborting discovery partway through. A candidate is rejected if
    /// its instantiated tool carries an empty name.
    pub fn discover(&self, candidates: &[ToolFactory]) -> Vec<String> {
        let mut errors = Vec::new();
        for factory in candidates {
            let tool = factory();
            if tool.name().is_empty() {
                errors.push("discovered tool with empty name, skipped".to_string());
                continue;
            }
            self.register(tool);
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool {
        schema: ParameterSchema,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "echoes the 'text' parameter"
        }

        fn parameter_schema(&self) -> &ParameterSchema {
            &self.schema
        }

        async fn execute(&self, params: HashMap<String, Value>, _cancel: CancellationToken) -> ToolResult {
            match params.get("text") {
                Some(v) => ToolResult::success(v.clone()),
                None => ToolResult::error("missing 'text'"),
            }
        }
    }

    fn echo_tool() -> ToolRef {
        Arc::new(EchoTool {
            schema: ParameterSchema::new().with_param(
                "text",
                ParameterDescriptor {
                    param_type: ParameterType::String,
                    required: true,
                    description: "text to echo".to_string(),
                },
            ),
        })
    }

    #[test]
    fn validate_parameters_checks_required_fields() {
        let tool = echo_tool();
        let mut params = HashMap::new();
        assert!(!tool.validate_parameters(&params));
        params.insert("text".to_string(), Value::String("hi".to_string()));
        assert!(tool.validate_parameters(&params));
    }

    #[test]
    fn registry_replaces_duplicate_registrations() {
        let registry = ToolRegistry::new();
        registry.register(echo_tool());
        registry.register(echo_tool());
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn factory_is_materialized_lazily_and_cached() {
        let registry = ToolRegistry::new();
        registry.register_factory("echo", Arc::new(echo_tool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nope").is_none());
    }
}
