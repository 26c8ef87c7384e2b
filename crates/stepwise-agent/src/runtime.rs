//! Conversation step orchestrator.
//!
//! Drives the bounded tool-calling loop.  Each step sends the history and
//! the registry's tool descriptions to the model; if the reply requests
//! tools, they are validated, executed concurrently, and their results are
//! appended as one `tool` message before the next step.  The loop ends when
//! the model stops requesting tools or the step budget runs out.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stepwise_tools::{ToolDefinition, ToolDescription, ToolError, ToolRegistry};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::TurnError;
use crate::events::{Emitter, EventSink, TurnEvent, TurnEvents};
use crate::invocation::{Invocation, InvocationState};
use crate::llm::caller::{ModelCaller, ModelRequest};
use crate::llm::types::{Message, Part, Role, ToolFailure, ToolOutcome};

/// Default number of steps per turn.
pub const DEFAULT_STEP_BUDGET: u32 = 3;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do with tool calls requested on the last permitted step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BudgetPolicy {
    /// Run the calls and append their real results, then end the turn with
    /// [`FinishReason::StepBudgetExceeded`].
    #[default]
    ExecuteThenReport,
    /// Do not run the calls; record a `step-budget-exceeded` failure for
    /// each one.
    SkipExecution,
}

/// Configuration for the orchestrator loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Maximum number of steps (model call + tool execution) per turn.
    pub step_budget: u32,

    /// Handling of tool calls requested on the last step.
    pub budget_policy: BudgetPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            step_budget: DEFAULT_STEP_BUDGET,
            budget_policy: BudgetPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Turn results
// ---------------------------------------------------------------------------

/// Why a turn ended without a turn-fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// The model replied without requesting tools.
    Completed,
    /// The budget ran out while the model still had tool calls whose
    /// results it never got to see.
    StepBudgetExceeded { unresolved: Vec<String> },
}

/// A turn that ran to completion.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Unique identifier for this turn.
    pub turn_id: Uuid,
    /// The full history: input messages plus everything appended.
    pub history: Vec<Message>,
    /// Steps started.
    pub steps_used: u32,
    /// Model caller invocations.
    pub model_calls: u32,
    /// How the turn ended.
    pub finish: FinishReason,
}

impl TurnOutcome {
    /// The final assistant message, if the turn ended on one.
    pub fn final_message(&self) -> Option<&Message> {
        self.history.last().filter(|m| m.role == Role::Assistant)
    }

    /// Text of the final assistant message, or an empty string.
    pub fn final_text(&self) -> String {
        self.final_message().map(Message::text).unwrap_or_default()
    }
}

/// A turn ended by a turn-fatal error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("turn {turn_id} failed: {error}")]
pub struct TurnFailure {
    pub turn_id: Uuid,
    #[source]
    pub error: TurnError,
    /// History accumulated before the failure.
    pub history: Vec<Message>,
    pub steps_used: u32,
    pub model_calls: u32,
}

/// Result of one turn.
pub type TurnResult = std::result::Result<TurnOutcome, TurnFailure>;

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs turns against a model caller and a shared tool registry.
///
/// The orchestrator itself holds no per-turn state; every call to
/// [`run`](Self::run) owns its own history and budget, so one orchestrator
/// can serve concurrent turns.
#[derive(Clone)]
pub struct Orchestrator {
    model: Arc<dyn ModelCaller>,
    registry: Arc<ToolRegistry>,
    config: AgentConfig,
}

/// Mutable state of a single turn.
struct Turn {
    id: Uuid,
    history: Vec<Message>,
    steps_used: u32,
    model_calls: u32,
}

impl Turn {
    fn finish(self, finish: FinishReason, emitter: &Emitter) -> TurnResult {
        tracing::info!(
            turn_id = %self.id,
            steps = self.steps_used,
            model_calls = self.model_calls,
            finish = ?finish,
            "turn finished"
        );
        emitter.emit(TurnEvent::TurnComplete {
            finish: finish.clone(),
        });
        Ok(TurnOutcome {
            turn_id: self.id,
            history: self.history,
            steps_used: self.steps_used,
            model_calls: self.model_calls,
            finish,
        })
    }

    fn fail(self, error: TurnError, emitter: &Emitter) -> TurnResult {
        match error {
            TurnError::Cancelled => {
                tracing::warn!(turn_id = %self.id, steps = self.steps_used, "turn cancelled");
            }
            ref e => {
                tracing::error!(turn_id = %self.id, steps = self.steps_used, error = %e, "turn failed");
            }
        }
        emitter.emit(TurnEvent::TurnFailed {
            error: error.clone(),
        });
        Err(TurnFailure {
            turn_id: self.id,
            error,
            history: self.history,
            steps_used: self.steps_used,
            model_calls: self.model_calls,
        })
    }
}

impl Orchestrator {
    /// Create an orchestrator.
    pub fn new(
        model: Arc<dyn ModelCaller>,
        registry: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        Self {
            model,
            registry,
            config,
        }
    }

    /// Override the step budget.
    pub fn with_step_budget(mut self, step_budget: u32) -> Self {
        self.config.step_budget = step_budget;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The shared registry.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run one turn.
    ///
    /// `history` must be non-empty; its last message is conventionally from
    /// the user.  Cancelling `cancel` stops the turn promptly: the in-flight
    /// model call is dropped and executing tools are recorded as cancelled.
    pub async fn run(&self, history: Vec<Message>, cancel: CancellationToken) -> TurnResult {
        self.drive(history, cancel, Emitter::default()).await
    }

    /// Run one turn, reporting progress to `sink`.
    pub async fn run_with_events(
        &self,
        history: Vec<Message>,
        cancel: CancellationToken,
        sink: EventSink,
    ) -> TurnResult {
        self.drive(history, cancel, Emitter::new(Some(sink))).await
    }

    /// Run one turn on a background task and stream its events.
    ///
    /// The returned stream ends after the final `TurnComplete` or
    /// `TurnFailed` event; the handle resolves to the turn result.
    pub fn run_streaming(
        &self,
        history: Vec<Message>,
        cancel: CancellationToken,
    ) -> (TurnEvents, JoinHandle<TurnResult>) {
        let (sink, events) = TurnEvents::channel();
        let this = self.clone();
        let handle =
            tokio::spawn(async move { this.run_with_events(history, cancel, sink).await });
        (events, handle)
    }

    async fn drive(
        &self,
        history: Vec<Message>,
        cancel: CancellationToken,
        emitter: Emitter,
    ) -> TurnResult {
        let mut turn = Turn {
            id: Uuid::now_v7(),
            history,
            steps_used: 0,
            model_calls: 0,
        };
        let mut budget = self.config.step_budget;

        if turn.history.is_empty() {
            return turn.fail(TurnError::invalid_request("history is empty"), &emitter);
        }
        if budget == 0 {
            return turn.fail(
                TurnError::invalid_request("step budget must be at least 1"),
                &emitter,
            );
        }

        let tools: Vec<ToolDescription> = self.registry.describe_all().collect();

        tracing::info!(
            turn_id = %turn.id,
            step_budget = budget,
            budget_policy = ?self.config.budget_policy,
            tool_count = tools.len(),
            "starting turn"
        );

        loop {
            turn.steps_used += 1;
            let step = turn.steps_used;
            tracing::debug!(turn_id = %turn.id, step, budget, "step start");

            // 1. Ask the model for the next assistant message.
            let text_emitter = emitter.clone();
            let on_text = move |delta: &str| {
                text_emitter.emit(TurnEvent::TextDelta {
                    text: delta.to_owned(),
                })
            };
            let request = ModelRequest {
                messages: &turn.history,
                tools: &tools,
                step,
            };
            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                reply = self.model.call(request, &on_text) => Some(reply),
            };
            let reply = match reply {
                None => return turn.fail(TurnError::Cancelled, &emitter),
                Some(reply) => {
                    turn.model_calls += 1;
                    match reply {
                        Ok(message) => message,
                        Err(e) => return turn.fail(e.into(), &emitter),
                    }
                }
            };

            // 2. Reject replies that cannot be a valid assistant message.
            if let Err(e) = check_reply(&reply) {
                return turn.fail(e, &emitter);
            }

            // 3. Append it.
            let calls: Vec<Invocation> = reply
                .tool_calls()
                .map(|c| Invocation::requested(c.call_id, c.tool_name, c.input.clone()))
                .collect();
            turn.history.push(reply);

            // 4. No tool calls: the turn is done.
            if calls.is_empty() {
                emitter.emit(TurnEvent::StepComplete { step });
                return turn.finish(FinishReason::Completed, &emitter);
            }

            budget -= 1;
            let last_step = budget == 0;
            let call_ids: Vec<String> = calls.iter().map(|c| c.call_id().to_owned()).collect();

            tracing::info!(
                turn_id = %turn.id,
                step,
                tool_count = calls.len(),
                tools = ?calls.iter().map(Invocation::tool_name).collect::<Vec<_>>(),
                "model requested tool calls"
            );

            // 5-7. Resolve every call and append one tool message.
            let skip = last_step && self.config.budget_policy == BudgetPolicy::SkipExecution;
            let results = match self.execute_step(calls, skip, &cancel, &emitter).await {
                Ok(results) => results,
                Err(e) => return turn.fail(e, &emitter),
            };
            turn.history.push(Message::tool_results(results));
            emitter.emit(TurnEvent::StepComplete { step });

            if cancel.is_cancelled() {
                return turn.fail(TurnError::Cancelled, &emitter);
            }

            // 8. Out of budget with results the model has not seen.
            if last_step {
                tracing::warn!(
                    turn_id = %turn.id,
                    step,
                    unresolved = ?call_ids,
                    "step budget exhausted with pending tool calls"
                );
                return turn.finish(
                    FinishReason::StepBudgetExceeded {
                        unresolved: call_ids,
                    },
                    &emitter,
                );
            }
        }
    }

    /// Validate and run one step's tool calls.
    ///
    /// Returns one `tool-result` part per call, in call order, regardless of
    /// the order in which executions finish.
    async fn execute_step(
        &self,
        calls: Vec<Invocation>,
        skip: bool,
        cancel: &CancellationToken,
        emitter: &Emitter,
    ) -> Result<Vec<Part>, TurnError> {
        // Dropping the turn mid-step cancels every execution it spawned.
        let step_cancel = cancel.child_token();
        let _abort_on_drop = step_cancel.clone().drop_guard();

        let mut pending: Vec<(Invocation, Option<JoinHandle<Result<Value, ToolFailure>>>)> =
            Vec::with_capacity(calls.len());

        for mut inv in calls {
            emitter.emit(TurnEvent::ToolCallRequested {
                call_id: inv.call_id().to_owned(),
                tool_name: inv.tool_name().to_owned(),
                input: inv.input().clone(),
            });

            let tool = match self.prepare(&mut inv)? {
                Some(tool) => tool,
                None => {
                    pending.push((inv, None));
                    continue;
                }
            };
            emitter.emit(TurnEvent::ToolCallInputReady {
                call_id: inv.call_id().to_owned(),
            });

            if skip {
                inv.fail(ToolFailure::step_budget_exceeded())?;
                pending.push((inv, None));
                continue;
            }
            if cancel.is_cancelled() {
                inv.fail(ToolFailure::cancelled())?;
                pending.push((inv, None));
                continue;
            }

            inv.mark_executing()?;
            let handle = spawn_execution(tool, inv.input().clone(), step_cancel.child_token());
            tracing::debug!(tool = %inv.tool_name(), call_id = %inv.call_id(), "executing tool");
            pending.push((inv, Some(handle)));
        }

        let mut results = Vec::with_capacity(pending.len());
        for (mut inv, handle) in pending {
            if let Some(handle) = handle {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(ToolFailure::execution(format!("tool task panicked: {e}"))),
                };
                match result {
                    Ok(output) => inv.succeed(output)?,
                    Err(failure) => {
                        tracing::warn!(
                            tool = %inv.tool_name(),
                            call_id = %inv.call_id(),
                            failure = %failure,
                            "tool execution failed"
                        );
                        inv.fail(failure)?;
                    }
                }
            }

            match inv.outcome() {
                Some(ToolOutcome::Output(output)) => emitter.emit(TurnEvent::ToolResultAvailable {
                    call_id: inv.call_id().to_owned(),
                    output: output.clone(),
                }),
                Some(ToolOutcome::Error(failure)) => emitter.emit(TurnEvent::ToolResultError {
                    call_id: inv.call_id().to_owned(),
                    failure: failure.clone(),
                }),
                None => {}
            }

            let call_id = inv.call_id().to_owned();
            let part = inv.into_result_part().ok_or_else(|| {
                TurnError::Internal(format!("call `{call_id}` finished without an outcome"))
            })?;
            results.push(part);
        }

        Ok(results)
    }

    /// Look up and validate one call.
    ///
    /// Returns the tool when the call is `input-ready`, or `None` after
    /// recording the failure on the invocation.
    fn prepare(&self, inv: &mut Invocation) -> Result<Option<Arc<ToolDefinition>>, TurnError> {
        let tool = match self.registry.lookup(inv.tool_name()) {
            Ok(tool) => tool,
            Err(_) => {
                tracing::warn!(tool = %inv.tool_name(), call_id = %inv.call_id(), "unknown tool requested");
                inv.fail(ToolFailure::unknown_tool(inv.tool_name()))?;
                return Ok(None);
            }
        };

        if let Err(e) = tool.validate(inv.input()) {
            tracing::warn!(tool = %inv.tool_name(), call_id = %inv.call_id(), error = %e, "tool input rejected");
            inv.fail(ToolFailure::schema_validation(e.to_string()))?;
            return Ok(None);
        }

        inv.mark_input_ready()?;
        Ok(Some(tool))
    }
}

/// Run one tool on its own task, racing it against cancellation.
fn spawn_execution(
    tool: Arc<ToolDefinition>,
    input: Value,
    cancel: CancellationToken,
) -> JoinHandle<Result<Value, ToolFailure>> {
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ToolFailure::cancelled()),
            result = tool.execute(input) => result.map_err(|e: ToolError| ToolFailure::execution(e.to_string())),
        }
    })
}

/// Structural checks on a model reply.
fn check_reply(reply: &Message) -> Result<(), TurnError> {
    if reply.role != Role::Assistant {
        return Err(TurnError::invalid_request(format!(
            "model replied with role `{}`, expected `assistant`",
            reply.role
        )));
    }

    if reply
        .parts
        .iter()
        .any(|p| matches!(p, Part::ToolResult { .. }))
    {
        return Err(TurnError::invalid_request(
            "model reply contains a tool-result part",
        ));
    }

    let mut seen = HashSet::new();
    for call in reply.tool_calls() {
        if call.state != InvocationState::Requested {
            return Err(TurnError::invalid_request(format!(
                "tool call `{}` arrived in state `{}`, expected `requested`",
                call.call_id, call.state
            )));
        }
        if call.call_id.is_empty() {
            return Err(TurnError::invalid_request(format!(
                "tool call for `{}` has an empty call id",
                call.tool_name
            )));
        }
        if !seen.insert(call.call_id) {
            return Err(TurnError::invalid_request(format!(
                "duplicate tool call id `{}` in one step",
                call.call_id
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.step_budget, 3);
        assert_eq!(config.budget_policy, BudgetPolicy::ExecuteThenReport);
    }

    #[test]
    fn budget_policy_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(BudgetPolicy::SkipExecution).unwrap(),
            json!("skip-execution")
        );
        let p: BudgetPolicy = serde_json::from_value(json!("execute-then-report")).unwrap();
        assert_eq!(p, BudgetPolicy::ExecuteThenReport);
    }

    #[test]
    fn check_reply_rejects_non_assistant_role() {
        let err = check_reply(&Message::user("hi")).unwrap_err();
        assert!(matches!(err, TurnError::InvalidRequest { .. }));
    }

    #[test]
    fn check_reply_rejects_duplicate_call_ids() {
        let reply = Message::assistant_parts(vec![
            Part::tool_call("c1", "a", json!({})),
            Part::tool_call("c1", "b", json!({})),
        ]);
        let err = check_reply(&reply).unwrap_err();
        assert!(err.to_string().contains("duplicate tool call id `c1`"));
    }

    #[test]
    fn check_reply_rejects_tool_results_from_model() {
        let reply = Message::assistant_parts(vec![Part::tool_result(
            "c1",
            "a",
            ToolOutcome::Output(json!("forged")),
        )]);
        let err = check_reply(&reply).unwrap_err();
        assert!(matches!(err, TurnError::InvalidRequest { .. }));
    }

    #[test]
    fn check_reply_rejects_calls_not_in_requested_state() {
        let reply = Message::assistant_parts(vec![Part::ToolCall {
            call_id: "c1".into(),
            tool_name: "a".into(),
            input: json!({}),
            state: InvocationState::Succeeded,
        }]);
        let err = check_reply(&reply).unwrap_err();
        assert!(err.to_string().contains("expected `requested`"));
    }

    #[test]
    fn check_reply_accepts_plain_text() {
        assert!(check_reply(&Message::assistant("done")).is_ok());
    }

    #[test]
    fn final_text_requires_trailing_assistant_message() {
        let outcome = TurnOutcome {
            turn_id: Uuid::now_v7(),
            history: vec![Message::user("q"), Message::tool_results(vec![])],
            steps_used: 1,
            model_calls: 1,
            finish: FinishReason::StepBudgetExceeded { unresolved: vec![] },
        };
        assert!(outcome.final_message().is_none());
        assert_eq!(outcome.final_text(), "");
    }
}
