//! The canonical (Anthropic Messages) streaming state machine:
//! reshapes upstream `v1internal` SSE parts, arriving one upstream line at a
//! time, into `message_start`/`content_block_*`/`message_delta`/
//! `message_stop` events. Used directly by the `/v1/messages` handler and
//! wrapped as an inner stage by [`crate::streaming::openai_chat`]. Grounded
//! on `protocol/anthropic/messages/sse.rs`'s tagged-union `StreamEvent`
//! shape, generalized from a parsed-event replay to an incremental
//! part-at-a-time machine driven by raw upstream lines.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    thinking::SignatureStore,
    upstream::envelope::{UpstreamPartOut, UpstreamResponseBody},
};

/// One Anthropic Messages SSE event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    MessageStart { message: StreamMessage },
    ContentBlockStart { index: u32, content_block: StartBlock },
    ContentBlockDelta { index: u32, delta: Delta },
    ContentBlockStop { index: u32 },
    MessageDelta { delta: MessageDeltaBody, usage: StreamUsage },
    MessageStop,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamMessage {
    pub id: String,
    pub r#type: &'static str,
    pub role: &'static str,
    pub content: Vec<Value>,
    pub model: String,
    pub stop_reason: Option<&'static str>,
    pub stop_sequence: Option<String>,
    pub usage: StreamUsage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartBlock {
    Text { text: String },
    Thinking { thinking: String, signature: String },
    ToolUse { id: String, name: String, input: Value },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageDeltaBody {
    pub stop_reason: &'static str,
    pub stop_sequence: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StreamUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_read_input_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenKind {
    Text,
    Thinking,
}

struct OpenBlock {
    index: u32,
    kind: OpenKind,
    signature: Option<String>,
}

/// Drives the canonical streaming state machine from upstream parts. Owns no
/// network state: the caller feeds it one [`UpstreamResponseBody`] per
/// upstream SSE line and collects the events it returns.
pub struct AnthropicStreamProcessor<'a> {
    model: String,
    store: &'a SignatureStore,
    started: bool,
    next_index: u32,
    open: Option<OpenBlock>,
    pending_trailing_signature: Option<String>,
    any_function_call: bool,
    last_finish_reason: Option<String>,
    usage: StreamUsage,
}

impl<'a> AnthropicStreamProcessor<'a> {
    pub fn new(model: String, store: &'a SignatureStore) -> Self {
        Self {
            model,
            store,
            started: false,
            next_index: 0,
            open: None,
            pending_trailing_signature: None,
            any_function_call: false,
            last_finish_reason: None,
            usage: StreamUsage::default(),
        }
    }

    /// Processes one upstream SSE line's decoded body, returning the events
    /// it produces.
    pub fn process(&mut self, body: UpstreamResponseBody) -> Vec<AnthropicStreamEvent> {
        let mut events = Vec::new();

        if let Some(usage) = &body.usage_metadata {
            self.usage = to_stream_usage(usage);
        }

        if !self.started {
            self.started = true;
            events.push(AnthropicStreamEvent::MessageStart {
                message: StreamMessage {
                    id: format!("msg_{}", Uuid::new_v4()),
                    r#type: "message",
                    role: "assistant",
                    content: Vec::new(),
                    model: self.model.clone(),
                    stop_reason: None,
                    stop_sequence: None,
                    usage: self.usage,
                },
            });
        }

        for candidate in &body.candidates {
            if let Some(reason) = &candidate.finish_reason {
                self.last_finish_reason = Some(reason.clone());
            }

            let Some(content) = &candidate.content else { continue };

            for part in &content.parts {
                self.process_part(part, &mut events);
            }
        }

        events
    }

    fn process_part(&mut self, part: &UpstreamPartOut, events: &mut Vec<AnthropicStreamEvent>) {
        if let Some(call) = &part.function_call {
            self.close_open(events);
            self.flush_pending_signature(events);

            let index = self.take_index();
            events.push(AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block: StartBlock::ToolUse {
                    id: call.id.clone().unwrap_or_else(|| call.name.clone()),
                    name: call.name.clone(),
                    input: Value::Object(Default::default()),
                },
            });
            events.push(AnthropicStreamEvent::ContentBlockDelta {
                index,
                delta: Delta::InputJsonDelta {
                    partial_json: call.args.to_string(),
                },
            });
            events.push(AnthropicStreamEvent::ContentBlockStop { index });

            self.any_function_call = true;
            return;
        }

        let text = part.text.clone().unwrap_or_default();
        let signature = part.thought_signature.as_deref().filter(|s| !s.is_empty());

        if part.thought == Some(true) {
            if !matches!(self.open.as_ref(), Some(block) if block.kind == OpenKind::Thinking) {
                self.close_open(events);
                self.flush_pending_signature(events);

                let index = self.take_index();
                events.push(AnthropicStreamEvent::ContentBlockStart {
                    index,
                    content_block: StartBlock::Thinking {
                        thinking: String::new(),
                        signature: String::new(),
                    },
                });
                self.open = Some(OpenBlock {
                    index,
                    kind: OpenKind::Thinking,
                    signature: None,
                });
            }

            if !text.is_empty() {
                let index = self.open.as_ref().expect("just opened").index;
                events.push(AnthropicStreamEvent::ContentBlockDelta {
                    index,
                    delta: Delta::ThinkingDelta { thinking: text },
                });
            }

            if let Some(sig) = signature {
                self.store.store(sig);
                if let Some(open) = self.open.as_mut() {
                    open.signature = Some(sig.to_owned());
                }
            }

            return;
        }

        if let Some(sig) = signature.filter(|_| text.is_empty()) {
            self.close_open(events);
            let sig = sig.to_owned();
            self.store.store(&sig);
            self.pending_trailing_signature = Some(sig);
            return;
        }

        if self.pending_trailing_signature.is_some() {
            self.flush_pending_signature(events);
        }

        if !matches!(self.open.as_ref(), Some(block) if block.kind == OpenKind::Text) {
            self.close_open(events);

            let index = self.take_index();
            events.push(AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block: StartBlock::Text { text: String::new() },
            });
            self.open = Some(OpenBlock {
                index,
                kind: OpenKind::Text,
                signature: None,
            });
        }

        if !text.is_empty() {
            let index = self.open.as_ref().expect("just opened").index;
            events.push(AnthropicStreamEvent::ContentBlockDelta {
                index,
                delta: Delta::TextDelta { text },
            });
        }
    }

    fn take_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    fn close_open(&mut self, events: &mut Vec<AnthropicStreamEvent>) {
        let Some(open) = self.open.take() else { return };

        if open.kind == OpenKind::Thinking
            && let Some(signature) = open.signature
        {
            events.push(AnthropicStreamEvent::ContentBlockDelta {
                index: open.index,
                delta: Delta::SignatureDelta { signature },
            });
        }

        events.push(AnthropicStreamEvent::ContentBlockStop { index: open.index });
    }

    fn flush_pending_signature(&mut self, events: &mut Vec<AnthropicStreamEvent>) {
        let Some(signature) = self.pending_trailing_signature.take() else { return };

        let index = self.take_index();
        events.push(AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block: StartBlock::Thinking {
                thinking: String::new(),
                signature: String::new(),
            },
        });
        events.push(AnthropicStreamEvent::ContentBlockDelta {
            index,
            delta: Delta::SignatureDelta { signature },
        });
        events.push(AnthropicStreamEvent::ContentBlockStop { index });
    }

    /// Called once the upstream stream has ended: closes any open block,
    /// flushes a pending trailing signature, and emits the terminal
    /// `message_delta`/`message_stop` pair.
    pub fn finish(mut self) -> Vec<AnthropicStreamEvent> {
        let mut events = Vec::new();

        if !self.started {
            events.push(AnthropicStreamEvent::MessageStart {
                message: StreamMessage {
                    id: format!("msg_{}", Uuid::new_v4()),
                    r#type: "message",
                    role: "assistant",
                    content: Vec::new(),
                    model: self.model.clone(),
                    stop_reason: None,
                    stop_sequence: None,
                    usage: self.usage,
                },
            });
        }

        self.close_open(&mut events);
        self.flush_pending_signature(&mut events);

        let stop_reason = if self.any_function_call {
            "tool_use"
        } else if self.last_finish_reason.as_deref() == Some("MAX_TOKENS") {
            "max_tokens"
        } else {
            "end_turn"
        };

        events.push(AnthropicStreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason,
                stop_sequence: None,
            },
            usage: self.usage,
        });
        events.push(AnthropicStreamEvent::MessageStop);

        events
    }
}

fn to_stream_usage(usage: &crate::upstream::envelope::UpstreamUsageMetadata) -> StreamUsage {
    StreamUsage {
        input_tokens: usage.prompt_token_count.saturating_sub(usage.cached_content_token_count),
        output_tokens: usage.candidates_token_count,
        cache_read_input_tokens: usage.cached_content_token_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::envelope::{UpstreamCandidate, UpstreamContentOut, UpstreamFunctionCallOut};

    fn body_with_parts(parts: Vec<UpstreamPartOut>, finish_reason: Option<&str>) -> UpstreamResponseBody {
        UpstreamResponseBody {
            candidates: vec![UpstreamCandidate {
                content: Some(UpstreamContentOut { parts }),
                finish_reason: finish_reason.map(str::to_owned),
            }],
            usage_metadata: None,
        }
    }

    fn text_part(text: &str) -> UpstreamPartOut {
        UpstreamPartOut {
            text: Some(text.to_owned()),
            thought: None,
            thought_signature: None,
            function_call: None,
            inline_data: None,
        }
    }

    #[test]
    fn first_body_emits_message_start() {
        let store = SignatureStore::new();
        let mut processor = AnthropicStreamProcessor::new("claude-sonnet-4-5".to_owned(), &store);

        let events = processor.process(body_with_parts(vec![text_part("hi")], None));
        assert!(matches!(events[0], AnthropicStreamEvent::MessageStart { .. }));
        assert!(matches!(events[1], AnthropicStreamEvent::ContentBlockStart { .. }));
        assert!(matches!(events[2], AnthropicStreamEvent::ContentBlockDelta { .. }));
    }

    #[test]
    fn trailing_signature_becomes_empty_thinking_block() {
        let store = SignatureStore::new();
        let mut processor = AnthropicStreamProcessor::new("claude-sonnet-4-5".to_owned(), &store);

        processor.process(body_with_parts(vec![text_part("hello")], None));

        let signature_only = UpstreamPartOut {
            text: None,
            thought: None,
            thought_signature: Some("s".repeat(60)),
            function_call: None,
            inline_data: None,
        };
        let events = processor.process(body_with_parts(vec![signature_only], None));

        assert!(events.iter().any(|e| matches!(e, AnthropicStreamEvent::ContentBlockStop { .. })));
        assert_eq!(store.get().unwrap().len(), 60);

        let finish_events = processor.finish();
        assert!(finish_events.iter().any(|e| matches!(
            e,
            AnthropicStreamEvent::ContentBlockStart {
                content_block: StartBlock::Thinking { .. },
                ..
            }
        )));
    }

    #[test]
    fn function_call_sets_tool_use_stop_reason() {
        let store = SignatureStore::new();
        let mut processor = AnthropicStreamProcessor::new("claude-sonnet-4-5".to_owned(), &store);

        processor.process(body_with_parts(
            vec![UpstreamPartOut {
                text: None,
                thought: None,
                thought_signature: None,
                function_call: Some(UpstreamFunctionCallOut {
                    name: "search".into(),
                    args: serde_json::json!({"q": "rust"}),
                    id: Some("call_1".into()),
                }),
                inline_data: None,
            }],
            None,
        ));

        let events = processor.finish();
        let Some(AnthropicStreamEvent::MessageDelta { delta, .. }) =
            events.iter().find(|e| matches!(e, AnthropicStreamEvent::MessageDelta { .. }))
        else {
            panic!("expected a message_delta event");
        };

        assert_eq!(delta.stop_reason, "tool_use");
    }

    #[test]
    fn max_tokens_finish_reason_maps_through() {
        let store = SignatureStore::new();
        let mut processor = AnthropicStreamProcessor::new("claude-sonnet-4-5".to_owned(), &store);

        processor.process(body_with_parts(vec![text_part("partial")], Some("MAX_TOKENS")));

        let events = processor.finish();
        let Some(AnthropicStreamEvent::MessageDelta { delta, .. }) =
            events.iter().find(|e| matches!(e, AnthropicStreamEvent::MessageDelta { .. }))
        else {
            panic!("expected a message_delta event");
        };

        assert_eq!(delta.stop_reason, "max_tokens");
    }
}
