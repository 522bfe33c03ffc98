//! Reassembles a finalized turn from streamed events.
//!
//! Streaming callers forward deltas to their own consumers as they arrive and
//! feed every event here; once the stream ends, [`TurnAccumulator::finish`]
//! yields the same [`CompletionResponse`] a non-streaming call would have
//! returned, so no second request is needed to learn the turn's tool calls.

use std::collections::BTreeMap;

use crate::backend::{BlockStart, ContentDelta, StreamEvent};
use crate::error::{LlmError, Result};
use crate::types::{CompletionResponse, ContentBlock, StopReason, Usage};

#[derive(Debug)]
enum PartialBlock {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        json: String,
    },
}

/// Collects stream events into a complete turn.
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    id: String,
    model: String,
    blocks: BTreeMap<usize, PartialBlock>,
    stop_reason: Option<StopReason>,
    usage: Usage,
    stopped: bool,
}

impl TurnAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the turn.
    ///
    /// In-band provider errors are returned as [`LlmError::Backend`].
    pub fn push(&mut self, event: &StreamEvent) -> Result<()> {
        match event {
            StreamEvent::MessageStart { id, model, usage } => {
                self.id = id.clone();
                self.model = model.clone();
                self.usage.input_tokens = usage.input_tokens;
            }
            StreamEvent::ContentBlockStart { index, block } => {
                let partial = match block {
                    BlockStart::Text => PartialBlock::Text(String::new()),
                    BlockStart::ToolUse { id, name } => PartialBlock::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        json: String::new(),
                    },
                };
                self.blocks.insert(*index, partial);
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                match (self.blocks.get_mut(index), delta) {
                    (Some(PartialBlock::Text(text)), ContentDelta::TextDelta(more)) => {
                        text.push_str(more)
                    }
                    (Some(PartialBlock::ToolUse { json, .. }), ContentDelta::InputJsonDelta(more)) => {
                        json.push_str(more)
                    }
                    _ => {
                        return Err(LlmError::Serialization(format!(
                            "delta for block {} does not match an open block",
                            index
                        )));
                    }
                }
            }
            StreamEvent::ContentBlockStop { .. } | StreamEvent::Ping => {}
            StreamEvent::MessageDelta { stop_reason, usage } => {
                self.stop_reason = Some(*stop_reason);
                self.usage.output_tokens = usage.output_tokens;
                if usage.input_tokens > 0 {
                    self.usage.input_tokens = usage.input_tokens;
                }
            }
            StreamEvent::MessageStop => self.stopped = true,
            StreamEvent::Error { message } => return Err(LlmError::Backend(message.clone())),
        }
        Ok(())
    }

    /// Whether a `MessageStop` has been seen.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Produce the finalized turn.
    ///
    /// Tool inputs are parsed from their accumulated JSON; an empty input
    /// becomes an empty object.
    pub fn finish(self) -> Result<CompletionResponse> {
        let mut content = Vec::with_capacity(self.blocks.len());
        for (_, block) in self.blocks {
            content.push(match block {
                PartialBlock::Text(text) => ContentBlock::Text { text },
                PartialBlock::ToolUse { id, name, json } => {
                    let input = if json.trim().is_empty() {
                        serde_json::Value::Object(Default::default())
                    } else {
                        serde_json::from_str(&json).map_err(|e| {
                            LlmError::Serialization(format!(
                                "invalid input for tool call {}: {}",
                                id, e
                            ))
                        })?
                    };
                    ContentBlock::ToolUse { id, name, input }
                }
            });
        }

        Ok(CompletionResponse {
            id: self.id,
            content,
            model: self.model,
            stop_reason: self.stop_reason,
            usage: self.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed(events: &[StreamEvent]) -> Result<CompletionResponse> {
        let mut acc = TurnAccumulator::new();
        for event in events {
            acc.push(event)?;
        }
        acc.finish()
    }

    #[test]
    fn test_text_and_tool_use_assembled() {
        let response = feed(&[
            StreamEvent::MessageStart {
                id: "msg_1".into(),
                model: "m".into(),
                usage: Usage::new(42, 1),
            },
            StreamEvent::ContentBlockStart {
                index: 0,
                block: BlockStart::Text,
            },
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::TextDelta("Let me ".into()),
            },
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::TextDelta("check.".into()),
            },
            StreamEvent::ContentBlockStop { index: 0 },
            StreamEvent::ContentBlockStart {
                index: 1,
                block: BlockStart::ToolUse {
                    id: "t1".into(),
                    name: "get_sample_data".into(),
                },
            },
            StreamEvent::ContentBlockDelta {
                index: 1,
                delta: ContentDelta::InputJsonDelta("{\"table_".into()),
            },
            StreamEvent::ContentBlockDelta {
                index: 1,
                delta: ContentDelta::InputJsonDelta("name\": \"orders\"}".into()),
            },
            StreamEvent::ContentBlockStop { index: 1 },
            StreamEvent::MessageDelta {
                stop_reason: StopReason::ToolUse,
                usage: Usage::new(0, 17),
            },
            StreamEvent::MessageStop,
        ])
        .unwrap();

        assert_eq!(response.id, "msg_1");
        assert_eq!(response.text(), "Let me check.");
        assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(response.usage, Usage::new(42, 17));
        let uses = response.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].input, json!({"table_name": "orders"}));
    }

    #[test]
    fn test_empty_tool_input_becomes_object() {
        let response = feed(&[
            StreamEvent::ContentBlockStart {
                index: 0,
                block: BlockStart::ToolUse {
                    id: "t1".into(),
                    name: "get_schema".into(),
                },
            },
            StreamEvent::ContentBlockStop { index: 0 },
            StreamEvent::MessageStop,
        ])
        .unwrap();

        assert_eq!(response.tool_uses()[0].input, json!({}));
    }

    #[test]
    fn test_in_band_error_surfaces() {
        let mut acc = TurnAccumulator::new();
        let err = acc
            .push(&StreamEvent::Error {
                message: "Overloaded".into(),
            })
            .unwrap_err();
        assert!(matches!(err, LlmError::Backend(m) if m == "Overloaded"));
    }

    #[test]
    fn test_malformed_tool_json_rejected() {
        let result = feed(&[
            StreamEvent::ContentBlockStart {
                index: 0,
                block: BlockStart::ToolUse {
                    id: "t1".into(),
                    name: "get_schema".into(),
                },
            },
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::InputJsonDelta("{\"tables\": [".into()),
            },
        ]);
        assert!(matches!(result, Err(LlmError::Serialization(_))));
    }

    #[test]
    fn test_mismatched_delta_rejected() {
        let mut acc = TurnAccumulator::new();
        let err = acc.push(&StreamEvent::ContentBlockDelta {
            index: 3,
            delta: ContentDelta::TextDelta("orphan".into()),
        });
        assert!(err.is_err());
    }
}
