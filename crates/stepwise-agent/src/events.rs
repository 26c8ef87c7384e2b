//! Turn event stream.
//!
//! While a turn runs, the orchestrator emits discrete [`TurnEvent`]s so an
//! embedding application can render progress: streamed text, tool calls
//! moving through their lifecycle, step boundaries and the final outcome.
//! Events are delivered either to a callback ([`EventSink`]) or through a
//! channel wrapped as a [`futures::Stream`] ([`TurnEvents`]).

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::TurnError;
use crate::llm::types::ToolFailure;
use crate::runtime::FinishReason;

/// One observable moment in a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// A fragment of assistant text.
    TextDelta { text: String },
    /// The model asked for a tool invocation.
    ToolCallRequested {
        call_id: String,
        tool_name: String,
        input: Value,
    },
    /// The invocation's input passed validation.
    ToolCallInputReady { call_id: String },
    /// The invocation succeeded.
    ToolResultAvailable { call_id: String, output: Value },
    /// The invocation failed.
    ToolResultError {
        call_id: String,
        failure: ToolFailure,
    },
    /// A step finished and its messages are in the history.
    StepComplete { step: u32 },
    /// The turn ended normally.
    TurnComplete { finish: FinishReason },
    /// The turn ended with a turn-fatal error.
    TurnFailed { error: TurnError },
}

/// Callback receiving turn events.
pub type EventSink = Arc<dyn Fn(TurnEvent) + Send + Sync>;

/// Emits events to an optional sink.
#[derive(Clone, Default)]
pub(crate) struct Emitter {
    sink: Option<EventSink>,
}

impl Emitter {
    pub(crate) fn new(sink: Option<EventSink>) -> Self {
        Self { sink }
    }

    pub(crate) fn emit(&self, event: TurnEvent) {
        if let Some(sink) = &self.sink {
            sink(event);
        }
    }
}

/// Receiving half of a streamed turn.
///
/// The stream ends once the turn has finished and every event has been
/// delivered.
#[derive(Debug)]
pub struct TurnEvents {
    rx: mpsc::UnboundedReceiver<TurnEvent>,
}

impl TurnEvents {
    /// Create a connected sink/stream pair.
    pub fn channel() -> (EventSink, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink: EventSink = Arc::new(move |event| {
            // The receiver may have been dropped; the turn keeps going.
            let _ = tx.send(event);
        });
        (sink, Self { rx })
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<TurnEvent> {
        self.rx.recv().await
    }
}

impl Stream for TurnEvents {
    type Item = TurnEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn channel_delivers_in_order_and_ends_when_sink_dropped() {
        let (sink, mut events) = TurnEvents::channel();
        let emitter = Emitter::new(Some(sink));
        emitter.emit(TurnEvent::StepComplete { step: 1 });
        emitter.emit(TurnEvent::StepComplete { step: 2 });
        drop(emitter);

        let collected: Vec<_> = (&mut events).collect().await;
        assert_eq!(
            collected,
            vec![
                TurnEvent::StepComplete { step: 1 },
                TurnEvent::StepComplete { step: 2 },
            ]
        );
        assert!(events.recv().await.is_none());
    }

    #[test]
    fn emitter_without_sink_is_silent() {
        Emitter::default().emit(TurnEvent::StepComplete { step: 1 });
    }
}
