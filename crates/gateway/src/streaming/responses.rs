//! OpenAI Responses streaming. Consumes upstream parts directly
//! rather than wrapping the canonical machine, since the Responses event
//! vocabulary (`response.*`, `output_item.*`, `content_part.*`) carries its
//! own `sequence_number` and item-lifecycle shape that doesn't map onto the
//! Anthropic block model. Any signature observed is pushed into the global
//! store directly, matching the carryover guarantee the canonical machine
//! provides for the other dialects.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{thinking::SignatureStore, upstream::envelope::UpstreamResponseBody};

const REASONING_SUMMARY_CAP: usize = 500;

fn truncate_summary(text: &str) -> String {
    if text.chars().count() > REASONING_SUMMARY_CAP {
        let truncated: String = text.chars().take(REASONING_SUMMARY_CAP).collect();
        format!("{truncated}…")
    } else {
        text.to_owned()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesStreamEvent {
    #[serde(rename = "response.created")]
    ResponseCreated { sequence_number: u64, response: ResponseStub },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { sequence_number: u64, output_index: u32, item: Value },
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded { sequence_number: u64, item_id: String, output_index: u32, content_index: u32, part: Value },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { sequence_number: u64, item_id: String, output_index: u32, content_index: u32, delta: String },
    #[serde(rename = "response.output_text.done")]
    OutputTextDone { sequence_number: u64, item_id: String, output_index: u32, content_index: u32, text: String },
    #[serde(rename = "response.content_part.done")]
    ContentPartDone { sequence_number: u64, item_id: String, output_index: u32, content_index: u32, part: Value },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta { sequence_number: u64, item_id: String, output_index: u32, delta: String },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone { sequence_number: u64, item_id: String, output_index: u32, arguments: String },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { sequence_number: u64, output_index: u32, item: Value },
    #[serde(rename = "response.completed")]
    ResponseCompleted { sequence_number: u64, response: ResponseStub },
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseStub {
    pub id: String,
    pub object: &'static str,
    pub model: String,
    pub status: &'static str,
}

enum OpenItem {
    Text { item_id: String, output_index: u32, content_index: u32, text: String },
    FunctionCall { item_id: String, output_index: u32, call_id: String, name: String, arguments: String },
}

struct OpenReasoning {
    item_id: String,
    output_index: u32,
    summary: String,
}

/// Drives the Responses streaming event sequence from upstream parts.
pub struct ResponsesStreamProcessor<'a> {
    id: String,
    model: String,
    store: &'a SignatureStore,
    seq: u64,
    next_output_index: u32,
    open: Option<OpenItem>,
    open_reasoning: Option<OpenReasoning>,
}

impl<'a> ResponsesStreamProcessor<'a> {
    pub fn new(model: String, store: &'a SignatureStore) -> Self {
        Self {
            id: format!("resp_{}", Uuid::new_v4()),
            model,
            store,
            seq: 0,
            next_output_index: 0,
            open: None,
            open_reasoning: None,
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    pub fn process(&mut self, body: UpstreamResponseBody) -> Vec<ResponsesStreamEvent> {
        let mut events = Vec::new();

        if self.seq == 0 {
            let seq = self.next_seq();
            events.push(ResponsesStreamEvent::ResponseCreated {
                sequence_number: seq,
                response: ResponseStub {
                    id: self.id.clone(),
                    object: "response",
                    model: self.model.clone(),
                    status: "in_progress",
                },
            });
        }

        for candidate in &body.candidates {
            let Some(content) = &candidate.content else { continue };

            for part in &content.parts {
                if let Some(sig) = part.thought_signature.as_deref().filter(|s| !s.is_empty()) {
                    self.store.store(sig);
                }

                if let Some(call) = &part.function_call {
                    self.close_reasoning(&mut events);
                    self.close_open(&mut events);

                    let output_index = self.take_index();
                    let item_id = format!("fc_{}", Uuid::new_v4());
                    let call_id = call.id.clone().unwrap_or_else(|| call.name.clone());

                    let seq = self.next_seq();
                    events.push(ResponsesStreamEvent::OutputItemAdded {
                        sequence_number: seq,
                        output_index,
                        item: serde_json::json!({
                            "type": "function_call",
                            "id": item_id,
                            "call_id": call_id,
                            "name": call.name,
                            "arguments": "",
                        }),
                    });

                    let arguments = call.args.to_string();
                    let seq = self.next_seq();
                    events.push(ResponsesStreamEvent::FunctionCallArgumentsDelta {
                        sequence_number: seq,
                        item_id: item_id.clone(),
                        output_index,
                        delta: arguments.clone(),
                    });

                    self.open = Some(OpenItem::FunctionCall {
                        item_id,
                        output_index,
                        call_id,
                        name: call.name.clone(),
                        arguments,
                    });
                    self.close_open(&mut events);
                    continue;
                }

                if part.thought == Some(true) {
                    let text = part.text.as_deref().unwrap_or_default();

                    if self.open_reasoning.is_none() {
                        let output_index = self.take_index();
                        let item_id = format!("rs_{}", Uuid::new_v4());

                        let seq = self.next_seq();
                        events.push(ResponsesStreamEvent::OutputItemAdded {
                            sequence_number: seq,
                            output_index,
                            item: serde_json::json!({"type": "reasoning", "id": item_id, "summary": []}),
                        });

                        self.open_reasoning = Some(OpenReasoning {
                            item_id,
                            output_index,
                            summary: String::new(),
                        });
                    }

                    if let Some(reasoning) = &mut self.open_reasoning {
                        reasoning.summary.push_str(text);
                    }

                    continue;
                }

                let Some(text) = part.text.as_deref().filter(|t| !t.is_empty()) else { continue };

                self.close_reasoning(&mut events);

                if !matches!(self.open, Some(OpenItem::Text { .. })) {
                    self.close_open(&mut events);

                    let output_index = self.take_index();
                    let item_id = format!("msg_{}", Uuid::new_v4());

                    let seq = self.next_seq();
                    events.push(ResponsesStreamEvent::OutputItemAdded {
                        sequence_number: seq,
                        output_index,
                        item: serde_json::json!({"type": "message", "id": item_id, "role": "assistant", "content": []}),
                    });
                    let seq = self.next_seq();
                    events.push(ResponsesStreamEvent::ContentPartAdded {
                        sequence_number: seq,
                        item_id: item_id.clone(),
                        output_index,
                        content_index: 0,
                        part: serde_json::json!({"type": "output_text", "text": ""}),
                    });

                    self.open = Some(OpenItem::Text { item_id, output_index, content_index: 0, text: String::new() });
                }

                if let Some(OpenItem::Text { item_id, output_index, content_index, text: accumulated }) = &mut self.open {
                    accumulated.push_str(text);
                    let seq = self.next_seq();
                    events.push(ResponsesStreamEvent::OutputTextDelta {
                        sequence_number: seq,
                        item_id: item_id.clone(),
                        output_index: *output_index,
                        content_index: *content_index,
                        delta: text.to_owned(),
                    });
                }
            }
        }

        events
    }

    fn take_index(&mut self) -> u32 {
        let index = self.next_output_index;
        self.next_output_index += 1;
        index
    }

    /// Closes an open reasoning item, truncating its accumulated summary to
    /// the character cap at close time.
    fn close_reasoning(&mut self, events: &mut Vec<ResponsesStreamEvent>) {
        let Some(reasoning) = self.open_reasoning.take() else { return };

        let summary = truncate_summary(&reasoning.summary);

        let seq = self.next_seq();
        events.push(ResponsesStreamEvent::OutputItemDone {
            sequence_number: seq,
            output_index: reasoning.output_index,
            item: serde_json::json!({
                "type": "reasoning",
                "id": reasoning.item_id,
                "summary": [{"type": "summary_text", "text": summary}],
            }),
        });
    }

    fn close_open(&mut self, events: &mut Vec<ResponsesStreamEvent>) {
        match self.open.take() {
            Some(OpenItem::Text { item_id, output_index, content_index, text }) => {
                let seq = self.next_seq();
                events.push(ResponsesStreamEvent::OutputTextDone {
                    sequence_number: seq,
                    item_id: item_id.clone(),
                    output_index,
                    content_index,
                    text: text.clone(),
                });
                let seq = self.next_seq();
                events.push(ResponsesStreamEvent::ContentPartDone {
                    sequence_number: seq,
                    item_id: item_id.clone(),
                    output_index,
                    content_index,
                    part: serde_json::json!({"type": "output_text", "text": text}),
                });
                let seq = self.next_seq();
                events.push(ResponsesStreamEvent::OutputItemDone {
                    sequence_number: seq,
                    output_index,
                    item: serde_json::json!({"type": "message", "id": item_id, "role": "assistant", "content": [{"type": "output_text", "text": text}]}),
                });
            }
            Some(OpenItem::FunctionCall { item_id, output_index, call_id, name, arguments }) => {
                let seq = self.next_seq();
                events.push(ResponsesStreamEvent::FunctionCallArgumentsDone {
                    sequence_number: seq,
                    item_id: item_id.clone(),
                    output_index,
                    arguments: arguments.clone(),
                });
                let seq = self.next_seq();
                events.push(ResponsesStreamEvent::OutputItemDone {
                    sequence_number: seq,
                    output_index,
                    item: serde_json::json!({
                        "type": "function_call",
                        "id": item_id,
                        "call_id": call_id,
                        "name": name,
                        "arguments": arguments,
                    }),
                });
            }
            None => {}
        }
    }

    pub fn finish(mut self) -> Vec<ResponsesStreamEvent> {
        let mut events = Vec::new();
        self.close_reasoning(&mut events);
        self.close_open(&mut events);

        let seq = self.next_seq();
        events.push(ResponsesStreamEvent::ResponseCompleted {
            sequence_number: seq,
            response: ResponseStub {
                id: self.id,
                object: "response",
                model: self.model,
                status: "completed",
            },
        });

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::envelope::{UpstreamCandidate, UpstreamContentOut, UpstreamFunctionCallOut, UpstreamPartOut};

    #[test]
    fn first_event_is_response_created() {
        let store = SignatureStore::new();
        let mut processor = ResponsesStreamProcessor::new("claude-sonnet-4-5".to_owned(), &store);

        let body = UpstreamResponseBody {
            candidates: vec![UpstreamCandidate {
                content: Some(UpstreamContentOut {
                    parts: vec![UpstreamPartOut {
                        text: Some("hi".into()),
                        thought: None,
                        thought_signature: None,
                        function_call: None,
                        inline_data: None,
                    }],
                }),
                finish_reason: None,
            }],
            usage_metadata: None,
        };

        let events = processor.process(body);
        assert!(matches!(events[0], ResponsesStreamEvent::ResponseCreated { .. }));
    }

    #[test]
    fn function_call_closes_immediately() {
        let store = SignatureStore::new();
        let mut processor = ResponsesStreamProcessor::new("claude-sonnet-4-5".to_owned(), &store);

        let body = UpstreamResponseBody {
            candidates: vec![UpstreamCandidate {
                content: Some(UpstreamContentOut {
                    parts: vec![UpstreamPartOut {
                        text: None,
                        thought: None,
                        thought_signature: None,
                        function_call: Some(UpstreamFunctionCallOut {
                            name: "search".into(),
                            args: serde_json::json!({}),
                            id: Some("call_1".into()),
                        }),
                        inline_data: None,
                    }],
                }),
                finish_reason: None,
            }],
            usage_metadata: None,
        };

        let events = processor.process(body);
        assert!(events.iter().any(|e| matches!(e, ResponsesStreamEvent::FunctionCallArgumentsDone { .. })));
        assert!(events.iter().any(|e| matches!(e, ResponsesStreamEvent::OutputItemDone { .. })));
    }

    fn thought_part(text: &str) -> UpstreamPartOut {
        UpstreamPartOut {
            text: Some(text.into()),
            thought: Some(true),
            thought_signature: None,
            function_call: None,
            inline_data: None,
        }
    }

    fn text_part(text: &str) -> UpstreamPartOut {
        UpstreamPartOut {
            text: Some(text.into()),
            thought: None,
            thought_signature: None,
            function_call: None,
            inline_data: None,
        }
    }

    #[test]
    fn reasoning_accumulates_and_closes_on_text() {
        let store = SignatureStore::new();
        let mut processor = ResponsesStreamProcessor::new("claude-sonnet-4-5".to_owned(), &store);

        let body = UpstreamResponseBody {
            candidates: vec![UpstreamCandidate {
                content: Some(UpstreamContentOut { parts: vec![thought_part("let me "), thought_part("think"), text_part("answer")] }),
                finish_reason: None,
            }],
            usage_metadata: None,
        };

        let events = processor.process(body);

        let added = events
            .iter()
            .find(|e| matches!(e, ResponsesStreamEvent::OutputItemAdded { item, .. } if item["type"] == "reasoning"))
            .expect("reasoning item opened");
        assert!(matches!(added, ResponsesStreamEvent::OutputItemAdded { .. }));

        let done = events
            .iter()
            .find(|e| matches!(e, ResponsesStreamEvent::OutputItemDone { item, .. } if item["type"] == "reasoning"))
            .expect("reasoning item closed");
        let ResponsesStreamEvent::OutputItemDone { item, .. } = done else { unreachable!() };
        assert_eq!(item["summary"][0]["text"], "let me think");

        // The reasoning close must precede the message item opened by the trailing text.
        let reasoning_done_pos = events.iter().position(|e| matches!(e, ResponsesStreamEvent::OutputItemDone { item, .. } if item["type"] == "reasoning")).unwrap();
        let message_added_pos = events.iter().position(|e| matches!(e, ResponsesStreamEvent::OutputItemAdded { item, .. } if item["type"] == "message")).unwrap();
        assert!(reasoning_done_pos < message_added_pos);
    }

    #[test]
    fn reasoning_summary_truncated_at_close() {
        let store = SignatureStore::new();
        let mut processor = ResponsesStreamProcessor::new("claude-sonnet-4-5".to_owned(), &store);

        let long_thought = "a".repeat(600);
        let body = UpstreamResponseBody {
            candidates: vec![UpstreamCandidate {
                content: Some(UpstreamContentOut { parts: vec![thought_part(&long_thought)] }),
                finish_reason: None,
            }],
            usage_metadata: None,
        };
        processor.process(body);

        let events = processor.finish();
        let done = events
            .iter()
            .find(|e| matches!(e, ResponsesStreamEvent::OutputItemDone { item, .. } if item["type"] == "reasoning"))
            .expect("reasoning item closed on finish");
        let ResponsesStreamEvent::OutputItemDone { item, .. } = done else { unreachable!() };
        let text = item["summary"][0]["text"].as_str().unwrap();
        assert_eq!(text.chars().count(), REASONING_SUMMARY_CAP + 1);
        assert!(text.ends_with('…'));
    }
}
