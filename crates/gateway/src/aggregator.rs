//! Collects a full upstream SSE response into a single [`CanonicalResponse`],
//! by replaying the canonical streaming state machine's own event sequence
//! rather than re-deriving block boundaries from raw upstream parts. This
//! keeps the non-streaming path mechanically tied to the streaming one: any
//! fix to block-open/close logic in [`crate::streaming::anthropic`] applies
//! to both without duplication.

use futures::StreamExt;

use crate::{
    canonical::{CanonicalResponse, ContentBlock, StopReason, Usage},
    error::GatewayResult,
    streaming::anthropic::{AnthropicStreamEvent, AnthropicStreamProcessor, Delta, StartBlock},
    thinking::SignatureStore,
    upstream::{client::SseLineStream, envelope::UpstreamLine},
};

enum Building {
    Text(String),
    Thinking { thinking: String, signature: Option<String> },
    ToolUse { id: String, name: String, input_json: String },
}

#[derive(Default)]
struct ResponseBuilder {
    blocks: Vec<ContentBlock>,
    open: Option<Building>,
    stop_reason: Option<StopReason>,
    usage: Usage,
}

impl ResponseBuilder {
    fn apply(&mut self, event: AnthropicStreamEvent) {
        match event {
            AnthropicStreamEvent::MessageStart { .. } => {}
            AnthropicStreamEvent::ContentBlockStart { content_block, .. } => {
                self.open = Some(match content_block {
                    StartBlock::Text { text } => Building::Text(text),
                    StartBlock::Thinking { thinking, signature } => Building::Thinking {
                        thinking,
                        signature: if signature.is_empty() { None } else { Some(signature) },
                    },
                    StartBlock::ToolUse { id, name, .. } => Building::ToolUse { id, name, input_json: String::new() },
                });
            }
            AnthropicStreamEvent::ContentBlockDelta { delta, .. } => match (delta, &mut self.open) {
                (Delta::TextDelta { text }, Some(Building::Text(acc))) => acc.push_str(&text),
                (Delta::ThinkingDelta { thinking }, Some(Building::Thinking { thinking: acc, .. })) => acc.push_str(&thinking),
                (Delta::SignatureDelta { signature }, Some(Building::Thinking { signature: acc, .. })) => *acc = Some(signature),
                (Delta::InputJsonDelta { partial_json }, Some(Building::ToolUse { input_json, .. })) => input_json.push_str(&partial_json),
                _ => {}
            },
            AnthropicStreamEvent::ContentBlockStop { .. } => {
                if let Some(open) = self.open.take() {
                    self.blocks.push(finalize(open));
                }
            }
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                self.stop_reason = Some(match delta.stop_reason {
                    "tool_use" => StopReason::ToolUse,
                    "max_tokens" => StopReason::MaxTokens,
                    _ => StopReason::EndTurn,
                });
                self.usage = Usage {
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    cache_read_input_tokens: usage.cache_read_input_tokens,
                };
            }
            AnthropicStreamEvent::MessageStop => {}
        }
    }

    fn finish(self, model: String) -> CanonicalResponse {
        CanonicalResponse {
            model,
            content: self.blocks,
            stop_reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
            usage: self.usage,
        }
    }
}

fn finalize(open: Building) -> ContentBlock {
    match open {
        Building::Text(text) => ContentBlock::Text { text },
        Building::Thinking { thinking, signature } => ContentBlock::Thinking {
            thinking,
            signature: signature.unwrap_or_default(),
        },
        Building::ToolUse { id, name, input_json } => {
            let input = if input_json.trim().is_empty() {
                serde_json::Value::Object(Default::default())
            } else {
                serde_json::from_str(&input_json).unwrap_or_else(|_| serde_json::Value::Object(Default::default()))
            };
            ContentBlock::ToolUse { id, name, input, signature: None }
        }
    }
}

/// Drains `lines` to completion, feeding each decoded upstream body through
/// [`AnthropicStreamProcessor`] and replaying its events into a single
/// assembled [`CanonicalResponse`]. Used by every dialect's non-streaming
/// handler; each adapter's `from_canonical` takes it from there.
pub async fn aggregate(mut lines: SseLineStream, model: String, store: &SignatureStore) -> GatewayResult<CanonicalResponse> {
    let mut processor = AnthropicStreamProcessor::new(model.clone(), store);
    let mut builder = ResponseBuilder::default();

    while let Some(line) = lines.next().await {
        let raw = line?;

        if raw == "[DONE]" {
            break;
        }

        let decoded: UpstreamLine = match serde_json::from_str(&raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("dropping malformed upstream line: {e}");
                continue;
            }
        };

        for event in processor.process(decoded.into_body()) {
            builder.apply(event);
        }
    }

    for event in processor.finish() {
        builder.apply(event);
    }

    Ok(builder.finish(model))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(json: serde_json::Value) -> GatewayResult<String> {
        Ok(json.to_string())
    }

    #[tokio::test]
    async fn aggregates_plain_text_response() {
        let store = SignatureStore::new();
        let lines: Vec<GatewayResult<String>> = vec![
            line(serde_json::json!({"candidates": [{"content": {"parts": [{"text": "hello "}]}}]})),
            line(serde_json::json!({"candidates": [{"content": {"parts": [{"text": "world"}]}, "finishReason": "STOP"}]})),
        ];
        let stream: SseLineStream = Box::pin(futures::stream::iter(lines));

        let response = aggregate(stream, "claude-sonnet-4-5".to_owned(), &store).await.unwrap();

        assert_eq!(response.content.len(), 1);
        assert!(matches!(&response.content[0], ContentBlock::Text { text } if text == "hello world"));
        assert_eq!(response.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn aggregates_tool_use_with_stop_reason() {
        let store = SignatureStore::new();
        let lines: Vec<GatewayResult<String>> = vec![line(serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"functionCall": {"name": "search", "args": {"q": "rust"}, "id": "call_1"}}]},
                "finishReason": "STOP",
            }]
        }))];
        let stream: SseLineStream = Box::pin(futures::stream::iter(lines));

        let response = aggregate(stream, "claude-sonnet-4-5".to_owned(), &store).await.unwrap();

        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert!(matches!(&response.content[0], ContentBlock::ToolUse { name, .. } if name == "search"));
    }

    #[tokio::test]
    async fn stops_on_done_sentinel() {
        let store = SignatureStore::new();
        let lines: Vec<GatewayResult<String>> = vec![
            line(serde_json::json!({"candidates": [{"content": {"parts": [{"text": "hi"}]}}]})),
            Ok("[DONE]".to_owned()),
        ];
        let stream: SseLineStream = Box::pin(futures::stream::iter(lines));

        let response = aggregate(stream, "claude-sonnet-4-5".to_owned(), &store).await.unwrap();
        assert!(matches!(&response.content[0], ContentBlock::Text { text } if text == "hi"));
    }
}
