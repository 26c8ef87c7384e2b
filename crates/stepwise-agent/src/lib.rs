//! Conversation step orchestrator for Stepwise.
//!
//! This crate drives a bounded tool-calling loop: the model is asked for the
//! next assistant message, any tool calls it makes are resolved against a
//! shared [`stepwise_tools::ToolRegistry`], and the results are fed back
//! until the model answers in plain text or the step budget runs out.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  history + tools  ┌──────────────┐
//! │ Orchestrator │──────────────────>│ ModelCaller  │
//! │  (runtime)   │<──────────────────│ (OpenAI SSE) │
//! └──────┬───────┘  assistant msg    └──────────────┘
//!        │
//!        │ validate + spawn per call
//!        v
//! ┌──────────────┐     ┌──────────────┐
//! │ ToolRegistry │────>│ ToolExecutor │
//! └──────────────┘     └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`llm`] -- Message model, model caller trait, OpenAI-compatible client.
//! - [`runtime`] -- The orchestrator loop and turn results.
//! - [`invocation`] -- Per-call lifecycle state machine.
//! - [`events`] -- Turn progress events.
//! - [`config`] -- TOML + environment configuration.
//! - [`error`] -- Turn, model and configuration errors.

pub mod config;
pub mod error;
pub mod events;
pub mod invocation;
pub mod llm;
pub mod runtime;

// Re-export the most commonly used types at the crate root.
pub use config::{AgentSettings, ProviderConfig, StepwiseConfig, ToolsConfig};
pub use error::{ConfigError, ConfigResult, ModelError, TurnError};
pub use events::{EventSink, TurnEvent, TurnEvents};
pub use invocation::{Invocation, InvocationState, TransitionError};
pub use llm::{
    FailureKind, Message, ModelCaller, ModelRequest, OpenAiCaller, OpenAiConfig, Part, Role,
    TextSink, ToolFailure, ToolOutcome,
};
pub use runtime::{
    AgentConfig, BudgetPolicy, DEFAULT_STEP_BUDGET, FinishReason, Orchestrator, TurnFailure,
    TurnOutcome, TurnResult,
};
