//! SSE stream parser for the OpenAI Chat Completions API.
//!
//! The OpenAI streaming format sends `data:` lines in standard SSE format
//! with JSON payloads containing `choices[].delta` objects.  The stream
//! terminates with a `data: [DONE]` sentinel.  This module folds those lines
//! into a single assistant [`Message`].

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ModelError;
use crate::llm::client::{source_parts, tool_call_part};
use crate::llm::types::{Message, Part};

// ---------------------------------------------------------------------------
// Stream accumulator
// ---------------------------------------------------------------------------

/// Accumulates fragments from an OpenAI SSE stream into a complete message.
///
/// Text deltas are concatenated.  Tool call deltas are correlated by their
/// `index`: the id and name usually arrive in the first chunk, argument
/// fragments follow in later ones.
#[derive(Debug, Default)]
pub struct OpenAiStreamAccumulator {
    /// Accumulated text content from `choices[].delta.content`.
    text: String,

    /// In-progress tool calls keyed by the provider's `index`.  Only
    /// indices that actually arrive get an entry.
    tool_call_builders: BTreeMap<u64, OpenAiToolCallBuilder>,

    /// Citations seen in `choices[].delta.annotations`.
    sources: Vec<Part>,

    /// Whether the `[DONE]` sentinel has been received.
    done: bool,
}

/// In-progress tool call being assembled from streaming deltas.
#[derive(Debug, Default)]
struct OpenAiToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
}

impl OpenAiStreamAccumulator {
    /// Create a new empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the `[DONE]` sentinel has been received.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a single SSE line from the stream.
    ///
    /// Returns `Ok(Some(text_delta))` when the line carried assistant text,
    /// `Ok(None)` for anything else.
    pub fn feed_line(&mut self, line: &str) -> Result<Option<String>, ModelError> {
        let line = line.trim_end();

        if line.is_empty() || line.starts_with(':') {
            return Ok(None);
        }

        // `event:`, `id:` and other SSE fields carry nothing we need.
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let data = data.trim();

        if data == "[DONE]" {
            self.done = true;
            return Ok(None);
        }

        let v: Value = serde_json::from_str(data).map_err(|e| {
            ModelError::invalid_request(format!("invalid JSON in OpenAI SSE data: {e}"))
        })?;

        // Some providers report mid-stream failures as a JSON error object.
        if let Some(err) = v.get("error").filter(|e| !e.is_null()) {
            let message = err["message"].as_str().unwrap_or("unknown stream error");
            return Err(ModelError::unavailable(format!("provider stream error: {message}")));
        }

        let delta = &v["choices"][0]["delta"];
        if delta.is_null() {
            return Ok(None);
        }

        let mut text_delta: Option<String> = None;
        if let Some(content) = delta["content"].as_str() {
            if !content.is_empty() {
                self.text.push_str(content);
                text_delta = Some(content.to_owned());
            }
        }

        if let Some(tool_calls) = delta["tool_calls"].as_array() {
            for tc in tool_calls {
                let index = tc["index"].as_u64().unwrap_or(0);
                let builder = self.tool_call_builders.entry(index).or_default();
                if let Some(id) = tc["id"].as_str() {
                    builder.id = id.to_owned();
                }

                let func = &tc["function"];
                if let Some(name) = func["name"].as_str() {
                    builder.name.push_str(name);
                }
                if let Some(args) = func["arguments"].as_str() {
                    builder.arguments.push_str(args);
                }
            }
        }

        self.sources.extend(source_parts(&delta["annotations"]));

        Ok(text_delta)
    }

    /// Consume the accumulator and produce the assistant message.
    ///
    /// Parts are ordered text, sources, then tool calls.
    pub fn into_message(self) -> Result<Message, ModelError> {
        let mut parts = Vec::with_capacity(1 + self.sources.len() + self.tool_call_builders.len());

        if !self.text.is_empty() {
            parts.push(Part::text(self.text));
        }
        parts.extend(self.sources);

        for b in self.tool_call_builders.into_values() {
            parts.push(tool_call_part(&b.id, &b.name, &b.arguments)?);
        }

        Ok(Message::assistant_parts(parts))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
