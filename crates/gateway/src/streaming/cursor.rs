//! Cursor streaming. Reuses the OpenAI Chat chunk shapes but
//! consumes upstream parts directly rather than through the canonical
//! machine: Cursor's client treats each tool call as a single atomic chunk
//! rather than a separate name/arguments delta pair.

use uuid::Uuid;

use crate::{
    streaming::openai_chat::{ChatChunk, ChunkChoice, ChunkDelta, ChunkFunctionCall, ChunkToolCall},
    thinking::SignatureStore,
    upstream::envelope::UpstreamResponseBody,
};

pub struct CursorStreamProcessor<'a> {
    id: String,
    model: String,
    store: &'a SignatureStore,
    role_sent: bool,
    tool_call_index: u32,
    any_function_call: bool,
    last_finish_reason: Option<String>,
}

impl<'a> CursorStreamProcessor<'a> {
    pub fn new(model: String, store: &'a SignatureStore) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4()),
            model,
            store,
            role_sent: false,
            tool_call_index: 0,
            any_function_call: false,
            last_finish_reason: None,
        }
    }

    fn make(&self, delta: ChunkDelta, finish_reason: Option<&'static str>) -> ChatChunk {
        ChatChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk",
            model: self.model.clone(),
            choices: vec![ChunkChoice { index: 0, delta, finish_reason }],
        }
    }

    pub fn process(&mut self, body: UpstreamResponseBody) -> Vec<ChatChunk> {
        let mut chunks = Vec::new();

        if !self.role_sent {
            self.role_sent = true;
            chunks.push(self.make(ChunkDelta { role: Some("assistant"), ..Default::default() }, None));
        }

        for candidate in &body.candidates {
            if let Some(reason) = &candidate.finish_reason {
                self.last_finish_reason = Some(reason.clone());
            }

            let Some(content) = &candidate.content else { continue };

            for part in &content.parts {
                if let Some(sig) = part.thought_signature.as_deref().filter(|s| !s.is_empty()) {
                    self.store.store(sig);
                }

                if let Some(call) = &part.function_call {
                    let index = self.tool_call_index;
                    self.tool_call_index += 1;
                    self.any_function_call = true;

                    chunks.push(self.make(
                        ChunkDelta {
                            tool_calls: vec![ChunkToolCall {
                                index,
                                id: Some(call.id.clone().unwrap_or_else(|| call.name.clone())),
                                r#type: Some("function"),
                                function: ChunkFunctionCall {
                                    name: Some(call.name.clone()),
                                    arguments: Some(call.args.to_string()),
                                },
                            }],
                            ..Default::default()
                        },
                        None,
                    ));
                    continue;
                }

                let text = part.text.clone().unwrap_or_default();
                if text.is_empty() {
                    continue;
                }

                if part.thought == Some(true) {
                    chunks.push(self.make(ChunkDelta { reasoning_content: Some(text), ..Default::default() }, None));
                } else {
                    chunks.push(self.make(ChunkDelta { content: Some(text), ..Default::default() }, None));
                }
            }
        }

        chunks
    }

    pub fn finish(self) -> Vec<ChatChunk> {
        let finish_reason = if self.any_function_call {
            "tool_calls"
        } else if self.last_finish_reason.as_deref() == Some("MAX_TOKENS") {
            "length"
        } else {
            "stop"
        };

        vec![self.make(ChunkDelta::default(), Some(finish_reason))]
    }
}
