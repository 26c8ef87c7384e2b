//! Tool invocation lifecycle.
//!
//! ```text
//! requested ──> input-ready ──> executing ──> succeeded
//!     │              │              │
//!     └──────────────┴──────────────┴──────> failed
//! ```
//!
//! Transitions only move forward.  `succeeded` and `failed` are terminal.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::types::{Part, ToolFailure, ToolOutcome};

/// Lifecycle state of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationState {
    /// The model asked for the call.
    Requested,
    /// The tool exists and the input matched its schema.
    InputReady,
    /// The execution capability is running.
    Executing,
    /// The tool returned an output.
    Succeeded,
    /// The invocation ended without an output.
    Failed,
}

impl InvocationState {
    /// Whether no further transition is allowed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether `self -> next` is a legal forward transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use InvocationState::*;
        matches!(
            (self, next),
            (Requested, InputReady)
                | (Requested, Failed)
                | (InputReady, Executing)
                | (InputReady, Failed)
                | (Executing, Succeeded)
                | (Executing, Failed)
        )
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Requested => "requested",
            Self::InputReady => "input-ready",
            Self::Executing => "executing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// An illegal lifecycle transition was attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition for call `{call_id}`: {from} -> {to}")]
pub struct TransitionError {
    pub call_id: String,
    pub from: InvocationState,
    pub to: InvocationState,
}

/// One tool invocation tracked through a step.
#[derive(Debug, Clone)]
pub struct Invocation {
    call_id: String,
    tool_name: String,
    input: Value,
    state: InvocationState,
    outcome: Option<ToolOutcome>,
}

impl Invocation {
    /// Start tracking a call in the `requested` state.
    pub fn requested(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            input,
            state: InvocationState::Requested,
            outcome: None,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    fn advance(&mut self, next: InvocationState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                call_id: self.call_id.clone(),
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(call_id = %self.call_id, from = %self.state, to = %next, "invocation transition");
        self.state = next;
        Ok(())
    }

    /// `requested -> input-ready`.
    pub fn mark_input_ready(&mut self) -> Result<(), TransitionError> {
        self.advance(InvocationState::InputReady)
    }

    /// `input-ready -> executing`.
    pub fn mark_executing(&mut self) -> Result<(), TransitionError> {
        self.advance(InvocationState::Executing)
    }

    /// `executing -> succeeded`.
    pub fn succeed(&mut self, output: Value) -> Result<(), TransitionError> {
        self.advance(InvocationState::Succeeded)?;
        self.outcome = Some(ToolOutcome::Output(output));
        Ok(())
    }

    /// Any non-terminal state `-> failed`.
    pub fn fail(&mut self, failure: ToolFailure) -> Result<(), TransitionError> {
        self.advance(InvocationState::Failed)?;
        self.outcome = Some(ToolOutcome::Error(failure));
        Ok(())
    }

    /// The recorded outcome, once terminal.
    pub fn outcome(&self) -> Option<&ToolOutcome> {
        self.outcome.as_ref()
    }

    /// The `tool-result` part for a terminal invocation.
    ///
    /// Returns `None` while the invocation is still in flight.
    pub fn into_result_part(self) -> Option<Part> {
        let outcome = self.outcome?;
        Some(Part::tool_result(self.call_id, self.tool_name, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALL: [InvocationState; 5] = [
        InvocationState::Requested,
        InvocationState::InputReady,
        InvocationState::Executing,
        InvocationState::Succeeded,
        InvocationState::Failed,
    ];

    #[test]
    fn terminal_states_allow_nothing() {
        for next in ALL {
            assert!(!InvocationState::Succeeded.can_transition_to(next));
            assert!(!InvocationState::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn no_state_reenters_itself_or_an_earlier_state() {
        for (i, from) in ALL.iter().enumerate().take(3) {
            for to in &ALL[..=i] {
                assert!(!from.can_transition_to(*to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn happy_path() {
        let mut inv = Invocation::requested("c1", "getWeather", json!({ "city": "Cairo" }));
        inv.mark_input_ready().unwrap();
        inv.mark_executing().unwrap();
        inv.succeed(json!("30°C, sunny")).unwrap();
        assert_eq!(inv.state(), InvocationState::Succeeded);

        let part = inv.into_result_part().unwrap();
        assert_eq!(
            part,
            Part::tool_result("c1", "getWeather", ToolOutcome::Output(json!("30°C, sunny")))
        );
    }

    #[test]
    fn validation_failure_skips_executing() {
        let mut inv = Invocation::requested("c1", "getWeather", json!({}));
        inv.fail(ToolFailure::schema_validation("missing city")).unwrap();
        assert_eq!(inv.state(), InvocationState::Failed);
        assert!(inv.mark_executing().is_err());
    }

    #[test]
    fn cannot_skip_input_ready() {
        let mut inv = Invocation::requested("c1", "t", json!({}));
        let err = inv.mark_executing().unwrap_err();
        assert_eq!(err.from, InvocationState::Requested);
        assert_eq!(err.to, InvocationState::Executing);
    }

    #[test]
    fn in_flight_invocation_has_no_result_part() {
        let mut inv = Invocation::requested("c1", "t", json!({}));
        inv.mark_input_ready().unwrap();
        assert!(inv.outcome().is_none());
        assert!(inv.into_result_part().is_none());
    }
}
