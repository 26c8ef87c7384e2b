//! Terminal rendering of turn events.

use std::io::{self, Write};

use stepwise_agent::{FinishReason, TurnEvent};

/// Writes turn events as they arrive.
///
/// Assistant text is printed inline as it streams; tool activity goes on
/// its own indented lines.
pub struct Renderer<W: Write> {
    out: W,
    /// Whether streamed text left the cursor mid-line.
    mid_line: bool,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            mid_line: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render(&mut self, event: &TurnEvent) -> io::Result<()> {
        match event {
            TurnEvent::TextDelta { text } => {
                write!(self.out, "{text}")?;
                self.mid_line = !text.ends_with('\n');
                self.out.flush()?;
            }
            TurnEvent::ToolCallRequested {
                tool_name, input, ..
            } => {
                self.line(&format!("  -> {tool_name}({input})"))?;
            }
            TurnEvent::ToolCallInputReady { .. } | TurnEvent::StepComplete { .. } => {}
            TurnEvent::ToolResultAvailable { call_id, output } => {
                self.line(&format!("  <- {call_id}: {output}"))?;
            }
            TurnEvent::ToolResultError { call_id, failure } => {
                self.line(&format!("  [error] {call_id}: {failure}"))?;
            }
            TurnEvent::TurnComplete { finish } => {
                if let FinishReason::StepBudgetExceeded { unresolved } = finish {
                    self.line(&format!(
                        "  [budget] step budget exhausted; unanswered calls: {}",
                        unresolved.join(", ")
                    ))?;
                } else {
                    self.end_line()?;
                }
            }
            TurnEvent::TurnFailed { error } => {
                self.line(&format!("  [error] {error}"))?;
            }
        }
        Ok(())
    }

    fn end_line(&mut self) -> io::Result<()> {
        if self.mid_line {
            writeln!(self.out)?;
            self.mid_line = false;
        }
        Ok(())
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        self.end_line()?;
        writeln!(self.out, "{text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepwise_agent::{ToolFailure, TurnError};

    fn render_all(events: &[TurnEvent]) -> String {
        let mut renderer = Renderer::new(Vec::new());
        for event in events {
            renderer.render(event).unwrap();
        }
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn tool_lines_break_streamed_text() {
        let out = render_all(&[
            TurnEvent::TextDelta {
                text: "Let me check".into(),
            },
            TurnEvent::ToolCallRequested {
                call_id: "c1".into(),
                tool_name: "get_weather".into(),
                input: json!({ "city": "Cairo" }),
            },
            TurnEvent::ToolResultAvailable {
                call_id: "c1".into(),
                output: json!("sunny"),
            },
            TurnEvent::TextDelta {
                text: "It is sunny.".into(),
            },
            TurnEvent::TurnComplete {
                finish: FinishReason::Completed,
            },
        ]);

        assert_eq!(
            out,
            "Let me check\n  -> get_weather({\"city\":\"Cairo\"})\n  <- c1: \"sunny\"\nIt is sunny.\n"
        );
    }

    #[test]
    fn failures_get_an_error_badge() {
        let out = render_all(&[
            TurnEvent::ToolResultError {
                call_id: "c1".into(),
                failure: ToolFailure::unknown_tool("get_location"),
            },
            TurnEvent::TurnFailed {
                error: TurnError::Cancelled,
            },
        ]);

        let lines: Vec<_> = out.lines().collect();
        assert!(lines[0].starts_with("  [error] c1: unknown-tool"));
        assert_eq!(lines[1], "  [error] turn cancelled");
    }

    #[test]
    fn budget_exhaustion_lists_unanswered_calls() {
        let out = render_all(&[TurnEvent::TurnComplete {
            finish: FinishReason::StepBudgetExceeded {
                unresolved: vec!["c1".into(), "c2".into()],
            },
        }]);
        assert!(out.contains("unanswered calls: c1, c2"));
    }
}
