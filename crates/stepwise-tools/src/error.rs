//! Tool and registry error types.
//!
//! Registry operations surface [`RegistryError`]; execution capabilities
//! surface [`ToolError`].  The orchestrator turns both into per-invocation
//! failures so a single bad call never aborts a turn.

/// Errors raised by [`crate::ToolRegistry`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A tool with this name is already registered.
    #[error("duplicate tool name: `{tool_name}`")]
    DuplicateToolName { tool_name: String },

    /// No tool with this name is registered.
    #[error("unknown tool: `{tool_name}`")]
    UnknownTool { tool_name: String },

    /// The tool name is not usable as a registry key.
    #[error("invalid tool name: {reason}")]
    InvalidName { reason: String },

    /// The declared input schema could not be compiled.
    #[error("invalid input schema for tool `{tool_name}`: {reason}")]
    InvalidSchema { tool_name: String, reason: String },

    /// An input payload does not conform to the tool's input schema.
    #[error("input for tool `{tool_name}` does not match its schema: {reason}")]
    SchemaValidation { tool_name: String, reason: String },
}

/// Errors raised by a tool's execution capability.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The input passed schema validation but is still unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The tool ran and failed.
    #[error("execution failed: {reason}")]
    ExecutionFailed { reason: String },

    /// The tool gave up waiting on an external dependency.
    #[error("timeout after {seconds}s: {reason}")]
    Timeout { seconds: u64, reason: String },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.  Prefer a typed variant
    /// whenever possible.
    #[error("internal tool error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Shorthand for [`ToolError::ExecutionFailed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            reason: reason.into(),
        }
    }
}

/// Convenience alias for tool execution results.
pub type Result<T> = std::result::Result<T, ToolError>;
