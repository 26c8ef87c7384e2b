//! Model integration layer.
//!
//! This module provides the interface between the orchestrator and large
//! language model providers.  It is organized into:
//!
//! - [`types`] -- The part-based message model shared by every provider.
//! - [`caller`] -- The [`ModelCaller`] seam the orchestrator calls through.
//! - [`client`] -- HTTP caller for OpenAI-compatible Chat Completions APIs.
//! - [`streaming_openai`] -- SSE stream parser for OpenAI incremental responses.

pub mod caller;
pub mod client;
pub mod streaming_openai;
pub mod types;

// Re-export the most commonly used types for convenience.
pub use caller::{ModelCaller, ModelRequest, TextSink};
pub use client::{OpenAiCaller, OpenAiConfig};
pub use types::{FailureKind, Message, Part, Role, ToolCallRef, ToolFailure, ToolOutcome};
