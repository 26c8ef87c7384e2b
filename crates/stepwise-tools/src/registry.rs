//! Tool registry.
//!
//! The registry maps a tool name to its description, its input schema and
//! its execution capability.  It is populated before any turn starts and is
//! read-only afterwards: registration takes `&mut self`, so once the
//! registry is shared behind an `Arc` nothing can be added mid-conversation.
//! Lookups and descriptions are lock-free reads and safe to run from any
//! number of concurrent turns.
//!
//! # Example
//!
//! ```rust
//! # use stepwise_tools::{tool_fn, ToolRegistry};
//! # use serde_json::json;
//! let mut registry = ToolRegistry::new();
//! registry
//!     .register(
//!         "echo",
//!         "Echo back the provided text.",
//!         json!({
//!             "type": "object",
//!             "properties": { "text": { "type": "string" } },
//!             "required": ["text"]
//!         }),
//!         tool_fn(|input| async move { Ok(input) }),
//!     )
//!     .unwrap();
//!
//! assert!(registry.lookup("echo").is_ok());
//! assert_eq!(registry.describe_all().count(), 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::error::{RegistryError, ToolError};
use crate::traits::{ToolDescription, ToolExecutor};

// ---------------------------------------------------------------------------
// Tool definition
// ---------------------------------------------------------------------------

/// A registered tool: name, description, schema and execution capability.
pub struct ToolDefinition {
    name: String,
    description: String,
    input_schema: Value,
    /// Compiled once at registration time.
    validator: JSONSchema,
    executor: Arc<dyn ToolExecutor>,
}

impl ToolDefinition {
    /// The unique registry key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description consumed by the model.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The raw JSON Schema for the tool's input.
    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Snapshot of what the model is told about this tool.
    pub fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }

    /// Check `input` against the compiled schema.
    ///
    /// On failure every violation is reported, each prefixed with its
    /// instance path and joined with `; `.
    pub fn validate(&self, input: &Value) -> Result<(), RegistryError> {
        if let Err(errors) = self.validator.validate(input) {
            let reason = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RegistryError::SchemaValidation {
                tool_name: self.name.clone(),
                reason,
            });
        }
        Ok(())
    }

    /// The shared execution capability.
    pub fn executor(&self) -> Arc<dyn ToolExecutor> {
        Arc::clone(&self.executor)
    }

    /// Run the tool.  Callers are expected to [`validate`](Self::validate)
    /// first.
    pub async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        self.executor.execute(input).await
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ToolDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.input_schema == other.input_schema
            && Arc::ptr_eq(&self.executor, &other.executor)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Registration-ordered tool registry.
#[derive(Default)]
pub struct ToolRegistry {
    /// Registration order.
    tools: Vec<Arc<ToolDefinition>>,
    /// Name -> position in `tools`.
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidName`] if `name` is blank.
    /// - [`RegistryError::DuplicateToolName`] if `name` is already taken.
    /// - [`RegistryError::InvalidSchema`] if `input_schema` does not compile.
    pub fn register<E>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        execute: E,
    ) -> Result<(), RegistryError>
    where
        E: ToolExecutor + 'static,
    {
        self.register_shared(name, description, input_schema, Arc::new(execute))
    }

    /// Register a tool whose executor is already shared.
    pub fn register_shared(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        execute: Arc<dyn ToolExecutor>,
    ) -> Result<(), RegistryError> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(RegistryError::InvalidName {
                reason: "tool name must not be empty".into(),
            });
        }
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateToolName { tool_name: name });
        }

        let validator = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&input_schema)
            .map_err(|e| RegistryError::InvalidSchema {
                tool_name: name.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!(tool = %name, "tool registered");

        self.index.insert(name.clone(), self.tools.len());
        self.tools.push(Arc::new(ToolDefinition {
            name,
            description: description.into(),
            input_schema,
            validator,
            executor: execute,
        }));

        Ok(())
    }

    /// Look up a tool by name.
    pub fn lookup(&self, name: &str) -> Result<Arc<ToolDefinition>, RegistryError> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.tools[i]))
            .ok_or_else(|| RegistryError::UnknownTool {
                tool_name: name.to_string(),
            })
    }

    /// Validate `input` for the named tool.
    pub fn validate_input(&self, name: &str, input: &Value) -> Result<(), RegistryError> {
        self.lookup(name)?.validate(input)
    }

    /// Describe every registered tool, in registration order.
    ///
    /// The iterator is lazy and finite; call again (or clone it) to restart.
    pub fn describe_all(
        &self,
    ) -> impl ExactSizeIterator<Item = ToolDescription> + Clone + '_ {
        self.tools.iter().map(|t| t.describe())
    }

    /// Names of all registered tools, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
