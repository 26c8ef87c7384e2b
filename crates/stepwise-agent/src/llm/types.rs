//! Conversation data model.
//!
//! A turn's history is an append-only `Vec<Message>`.  Each message is a
//! role plus an ordered list of [`Part`]s; parts are never edited in place.
//! A tool invocation's progress is recorded by appending new parts for the
//! same call id (a `tool-call` in the assistant message, then a
//! `tool-result` in the following tool message).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::invocation::InvocationState;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The role of a participant in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions that shape model behavior.
    System,
    /// Input from the human user.
    User,
    /// Output from the model.
    Assistant,
    /// Results of tool invocations, fed back to the model.
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A single message in a conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message.
    pub role: Role,

    /// Parts in emission order.
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Message {
    /// Create a message from parts.
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![Part::text(text)])
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    /// Create an assistant text message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![Part::text(text)])
    }

    /// Create an assistant message from arbitrary parts.
    pub fn assistant_parts(parts: Vec<Part>) -> Self {
        Self::new(Role::Assistant, parts)
    }

    /// Create a tool message carrying `tool-result` parts.
    pub fn tool_results(parts: Vec<Part>) -> Self {
        Self::new(Role::Tool, parts)
    }

    /// Concatenated `text` parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The `tool-call` parts of this message, in emission order.
    pub fn tool_calls(&self) -> impl Iterator<Item = ToolCallRef<'_>> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolCall {
                call_id,
                tool_name,
                input,
                state,
            } => Some(ToolCallRef {
                call_id,
                tool_name,
                input,
                state: *state,
            }),
            _ => None,
        })
    }

    /// Whether this message requests any tool invocation.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls().next().is_some()
    }

    /// The `tool-result` parts of this message, as `(call_id, outcome)`.
    pub fn tool_results_iter(&self) -> impl Iterator<Item = (&str, &ToolOutcome)> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolResult {
                call_id, outcome, ..
            } => Some((call_id.as_str(), outcome)),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Parts
// ---------------------------------------------------------------------------

/// One discrete model emission or tool outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    /// Plain text.
    Text { text: String },

    /// A request to invoke a named tool.
    ToolCall {
        call_id: String,
        tool_name: String,
        input: Value,
        state: InvocationState,
    },

    /// The terminal outcome of one invocation.
    ToolResult {
        call_id: String,
        tool_name: String,
        outcome: ToolOutcome,
    },

    /// A cited source.
    Source {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

impl Part {
    /// A `text` part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// A freshly requested `tool-call` part.
    pub fn tool_call(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
    ) -> Self {
        Self::ToolCall {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            input,
            state: InvocationState::Requested,
        }
    }

    /// A `tool-result` part.
    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        outcome: ToolOutcome,
    ) -> Self {
        Self::ToolResult {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            outcome,
        }
    }

    /// A `source` part.
    pub fn source(uri: impl Into<String>, title: Option<String>) -> Self {
        Self::Source {
            uri: uri.into(),
            title,
        }
    }
}

/// Borrowed view of a `tool-call` part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolCallRef<'a> {
    pub call_id: &'a str,
    pub tool_name: &'a str,
    pub input: &'a Value,
    pub state: InvocationState,
}

// ---------------------------------------------------------------------------
// Tool outcomes
// ---------------------------------------------------------------------------

/// Output payload or failure of a finished invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The tool succeeded with this output.
    Output(Value),
    /// The invocation failed.
    Error(ToolFailure),
}

impl ToolOutcome {
    /// The terminal lifecycle state this outcome corresponds to.
    pub fn state(&self) -> InvocationState {
        match self {
            Self::Output(_) => InvocationState::Succeeded,
            Self::Error(_) => InvocationState::Failed,
        }
    }

    /// The failure, if any.
    pub fn failure(&self) -> Option<&ToolFailure> {
        match self {
            Self::Output(_) => None,
            Self::Error(f) => Some(f),
        }
    }

    /// The output, if any.
    pub fn output(&self) -> Option<&Value> {
        match self {
            Self::Output(v) => Some(v),
            Self::Error(_) => None,
        }
    }
}

/// Why an invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The model named a tool that is not registered.
    UnknownTool,
    /// The input payload did not match the tool's schema.
    SchemaValidation,
    /// The tool's execution capability failed.
    ToolExecution,
    /// The step budget ran out before the model could see this result.
    StepBudgetExceeded,
    /// The turn was cancelled while this invocation was in flight.
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnknownTool => "unknown-tool",
            Self::SchemaValidation => "schema-validation",
            Self::ToolExecution => "tool-execution",
            Self::StepBudgetExceeded => "step-budget-exceeded",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A per-invocation failure, visible to the model on the next step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ToolFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_tool(tool_name: &str) -> Self {
        Self::new(
            FailureKind::UnknownTool,
            format!("tool `{tool_name}` is not registered"),
        )
    }

    pub fn schema_validation(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::SchemaValidation, reason)
    }

    pub fn execution(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::ToolExecution, reason)
    }

    pub fn step_budget_exceeded() -> Self {
        Self::new(
            FailureKind::StepBudgetExceeded,
            "step budget exhausted before the tool could run",
        )
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "turn cancelled")
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parts_serialize_with_kebab_case_tags() {
        let call = Part::tool_call("c1", "getWeather", json!({ "city": "Cairo" }));
        let v = serde_json::to_value(&call).unwrap();
        assert_eq!(v["type"], "tool-call");
        assert_eq!(v["state"], "requested");

        let result = Part::tool_result(
            "c1",
            "getWeather",
            ToolOutcome::Error(ToolFailure::unknown_tool("getWeather")),
        );
        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(v["type"], "tool-result");
        assert_eq!(v["outcome"]["error"]["kind"], "unknown-tool");

        let back: Part = serde_json::from_value(v).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn source_title_is_optional() {
        let v = serde_json::to_value(Part::source("https://example.com", None)).unwrap();
        assert_eq!(v, json!({ "type": "source", "uri": "https://example.com" }));
    }

    #[test]
    fn message_text_concatenates_text_parts_only() {
        let msg = Message::assistant_parts(vec![
            Part::text("Hello, "),
            Part::tool_call("c1", "t", json!({})),
            Part::text("world"),
        ]);
        assert_eq!(msg.text(), "Hello, world");
        assert!(msg.has_tool_calls());
        assert_eq!(msg.tool_calls().count(), 1);
    }

    #[test]
    fn outcome_maps_to_terminal_state() {
        assert_eq!(
            ToolOutcome::Output(json!(1)).state(),
            InvocationState::Succeeded
        );
        assert_eq!(
            ToolOutcome::Error(ToolFailure::cancelled()).state(),
            InvocationState::Failed
        );
    }
}
