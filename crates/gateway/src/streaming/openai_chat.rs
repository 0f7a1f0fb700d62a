//! OpenAI Chat Completions streaming: wraps the canonical
//! Anthropic state machine as an inner stage and translates each emitted
//! event into `chat.completion.chunk` deltas. Signature deltas update the
//! global signature store (done inside the wrapped machine) and otherwise
//! produce no chunk of their own.

use serde::Serialize;
use uuid::Uuid;

use crate::{
    streaming::anthropic::{AnthropicStreamEvent, AnthropicStreamProcessor, Delta, StartBlock},
    thinking::SignatureStore,
    upstream::envelope::UpstreamResponseBody,
};

#[derive(Debug, Clone, Serialize)]
pub struct ChatChunk {
    pub id: String,
    pub object: &'static str,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<&'static str>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ChunkToolCall>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkToolCall {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<&'static str>,
    pub function: ChunkFunctionCall,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkFunctionCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

fn finish_reason_str(reason: &str) -> &'static str {
    match reason {
        "tool_use" => "tool_calls",
        "max_tokens" => "length",
        _ => "stop",
    }
}

pub struct OpenAiChatStreamProcessor<'a> {
    id: String,
    model: String,
    inner: AnthropicStreamProcessor<'a>,
    role_sent: bool,
    tool_call_index: u32,
    block_to_tool_index: std::collections::HashMap<u32, u32>,
}

impl<'a> OpenAiChatStreamProcessor<'a> {
    pub fn new(model: String, store: &'a SignatureStore) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4()),
            model: model.clone(),
            inner: AnthropicStreamProcessor::new(model, store),
            role_sent: false,
            tool_call_index: 0,
            block_to_tool_index: std::collections::HashMap::new(),
        }
    }

    pub fn process(&mut self, body: UpstreamResponseBody) -> Vec<ChatChunk> {
        let events = self.inner.process(body);
        self.translate(events, None)
    }

    pub fn finish(mut self) -> Vec<ChatChunk> {
        let id = self.id.clone();
        let model = self.model.clone();
        let events = self.inner.finish();
        Self::translate_with(&id, &model, &mut self.role_sent, &mut self.tool_call_index, &mut self.block_to_tool_index, events)
    }

    fn translate(&mut self, events: Vec<AnthropicStreamEvent>, _unused: Option<()>) -> Vec<ChatChunk> {
        let id = self.id.clone();
        let model = self.model.clone();
        Self::translate_with(&id, &model, &mut self.role_sent, &mut self.tool_call_index, &mut self.block_to_tool_index, events)
    }

    fn translate_with(
        id: &str,
        model: &str,
        role_sent: &mut bool,
        tool_call_index: &mut u32,
        block_to_tool_index: &mut std::collections::HashMap<u32, u32>,
        events: Vec<AnthropicStreamEvent>,
    ) -> Vec<ChatChunk> {
        let mut chunks = Vec::new();

        let make = |delta: ChunkDelta, finish_reason: Option<&'static str>| ChatChunk {
            id: id.to_owned(),
            object: "chat.completion.chunk",
            model: model.to_owned(),
            choices: vec![ChunkChoice { index: 0, delta, finish_reason }],
        };

        for event in events {
            match event {
                AnthropicStreamEvent::MessageStart { .. } => {
                    if !*role_sent {
                        *role_sent = true;
                        chunks.push(make(ChunkDelta { role: Some("assistant"), ..Default::default() }, None));
                    }
                }
                AnthropicStreamEvent::ContentBlockStart { index, content_block: StartBlock::ToolUse { id: call_id, name, .. } } => {
                    let tool_index = *tool_call_index;
                    *tool_call_index += 1;
                    block_to_tool_index.insert(index, tool_index);

                    chunks.push(make(
                        ChunkDelta {
                            tool_calls: vec![ChunkToolCall {
                                index: tool_index,
                                id: Some(call_id),
                                r#type: Some("function"),
                                function: ChunkFunctionCall { name: Some(name), arguments: Some(String::new()) },
                            }],
                            ..Default::default()
                        },
                        None,
                    ));
                }
                AnthropicStreamEvent::ContentBlockStart { .. } => {}
                AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                    Delta::TextDelta { text } => {
                        chunks.push(make(ChunkDelta { content: Some(text), ..Default::default() }, None));
                    }
                    Delta::ThinkingDelta { thinking } => {
                        chunks.push(make(ChunkDelta { reasoning_content: Some(thinking), ..Default::default() }, None));
                    }
                    Delta::InputJsonDelta { partial_json } => {
                        if let Some(&tool_index) = block_to_tool_index.get(&index) {
                            chunks.push(make(
                                ChunkDelta {
                                    tool_calls: vec![ChunkToolCall {
                                        index: tool_index,
                                        id: None,
                                        r#type: None,
                                        function: ChunkFunctionCall { name: None, arguments: Some(partial_json) },
                                    }],
                                    ..Default::default()
                                },
                                None,
                            ));
                        }
                    }
                    Delta::SignatureDelta { .. } => {}
                },
                AnthropicStreamEvent::ContentBlockStop { .. } => {}
                AnthropicStreamEvent::MessageDelta { delta, .. } => {
                    chunks.push(make(ChunkDelta::default(), Some(finish_reason_str(delta.stop_reason))));
                }
                AnthropicStreamEvent::MessageStop => {}
            }
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::envelope::{UpstreamCandidate, UpstreamContentOut, UpstreamPartOut};

    #[test]
    fn first_chunk_carries_role() {
        let store = SignatureStore::new();
        let mut processor = OpenAiChatStreamProcessor::new("claude-sonnet-4-5".to_owned(), &store);

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

        let chunks = processor.process(body);
        assert_eq!(chunks[0].choices[0].delta.role, Some("assistant"));
    }

    #[test]
    fn finish_emits_finish_reason() {
        let store = SignatureStore::new();
        let processor = OpenAiChatStreamProcessor::new("claude-sonnet-4-5".to_owned(), &store);
        let chunks = processor.finish();
        assert!(chunks.iter().any(|c| c.choices[0].finish_reason.is_some()));
    }
}
