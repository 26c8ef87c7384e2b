//! The model caller boundary.
//!
//! The orchestrator treats inference as an opaque async capability.  Any
//! provider (or a scripted mock in tests) plugs in by implementing
//! [`ModelCaller`].

use async_trait::async_trait;
use stepwise_tools::ToolDescription;

use crate::error::ModelError;
use crate::llm::types::Message;

/// Receives incremental assistant text while a reply is being produced.
pub type TextSink = dyn Fn(&str) + Send + Sync;

/// Everything a model caller needs for one step.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    /// The full history so far, oldest first.
    pub messages: &'a [Message],
    /// Tools the model may request, in registration order.
    pub tools: &'a [ToolDescription],
    /// One-based step number within the turn.
    pub step: u32,
}

/// The external inference boundary.
#[async_trait]
pub trait ModelCaller: Send + Sync {
    /// Produce the next assistant message.
    ///
    /// The returned message should have role `assistant` and may contain
    /// `text`, `source` and `tool-call` parts.  Implementations that stream
    /// should forward text fragments to `on_text` as they arrive; the
    /// returned message must still contain the full text.
    ///
    /// The future may be dropped at any await point when the turn is
    /// cancelled.
    async fn call(
        &self,
        request: ModelRequest<'_>,
        on_text: &TextSink,
    ) -> Result<Message, ModelError>;
}
