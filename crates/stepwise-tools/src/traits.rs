//! The tool execution capability and supporting types.
//!
//! Every tool plugs into the registry through [`ToolExecutor`], a single
//! method contract from validated input to output-or-failure.  Closures are
//! adapted with [`tool_fn`].

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// What the model sees about a tool when choosing what to call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescription {
    /// Machine-readable tool name (e.g. `get_weather`).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema describing the tool's input.
    pub input_schema: Value,
}

// ---------------------------------------------------------------------------
// Core trait
// ---------------------------------------------------------------------------

/// The execution capability of a registered tool.
///
/// `input` has already been validated against the tool's schema when the
/// orchestrator calls this.  Implementations must not assume any retry: a
/// returned error is recorded as the invocation's final result.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run the tool and return its JSON output.
    async fn execute(&self, input: Value) -> Result<Value>;
}

/// A [`ToolExecutor`] backed by an async closure.
pub struct FnTool<F> {
    f: F,
}

/// Wrap an async closure as a [`ToolExecutor`].
///
/// ```rust
/// # use stepwise_tools::{tool_fn, ToolExecutor};
/// # use serde_json::json;
/// let echo = tool_fn(|input| async move { Ok(input) });
/// # let _ = echo;
/// ```
pub fn tool_fn<F, Fut>(f: F) -> FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    FnTool { f }
}

#[async_trait]
impl<F, Fut> ToolExecutor for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn execute(&self, input: Value) -> Result<Value> {
        (self.f)(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use serde_json::json;

    #[tokio::test]
    async fn fn_tool_forwards_input() {
        let tool = tool_fn(|input| async move { Ok(json!({ "echo": input })) });
        let out = tool.execute(json!("hi")).await.unwrap();
        assert_eq!(out, json!({ "echo": "hi" }));
    }

    #[tokio::test]
    async fn fn_tool_propagates_errors() {
        let tool = tool_fn(|_| async move { Err(ToolError::failed("boom")) });
        let err = tool.execute(Value::Null).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
