//! OpenAI Chat Completions ↔ canonical. Grounded on
//! `adapters/anthropic.rs`'s wire-type structure, generalized to the
//! role-tagged message array and `tool`-role flush-before-next-message
//! bookkeeping this dialect needs that the canonical dialect doesn't.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::canonical::{
    CanonicalRequest, CanonicalResponse, ContentBlock, Message, MessageContent, Role, StopReason, ThinkingRequest, Tool, non_sentinel,
};

// ---- inbound (request) ------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(default, deserialize_with = "super::lenient::max_tokens")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub tools: Vec<WireTool>,
}

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<WireContent>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<WireToolCall>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Debug, Deserialize)]
pub struct WireImageUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    pub function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub struct WireTool {
    pub function: WireToolFunction,
}

#[derive(Debug, Deserialize)]
pub struct WireToolFunction {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

/// Decodes a `data:` URL's base64 payload into `(media_type, data)`, or
/// passes the whole string through as opaque data when it isn't one.
fn decompose_data_url(url: &str) -> (String, String) {
    if let Some(rest) = url.strip_prefix("data:")
        && let Some((meta, data)) = rest.split_once(',')
    {
        let media_type = meta.split(';').next().unwrap_or("application/octet-stream").to_owned();
        return (media_type, data.to_owned());
    }

    ("application/octet-stream".to_owned(), url.to_owned())
}

fn wire_content_to_blocks(content: WireContent) -> Vec<ContentBlock> {
    match content {
        WireContent::Text(text) => vec![ContentBlock::text(text)],
        WireContent::Parts(parts) => parts
            .into_iter()
            .map(|part| match part {
                WirePart::Text { text } => ContentBlock::text(text),
                WirePart::ImageUrl { image_url } => {
                    let (media_type, data) = decompose_data_url(&image_url.url);
                    ContentBlock::Image { media_type, data }
                }
            })
            .collect(),
    }
}

/// Converts an OpenAI Chat Completions request into the canonical
/// representation. `tool`-role messages accumulate and flush as a single
/// user message with `tool_result` blocks immediately before the next
/// non-tool message.
pub fn to_canonical(request: ChatRequest) -> CanonicalRequest {
    let mut system_parts = Vec::new();
    let mut messages = Vec::new();
    let mut pending_tool_results: Vec<ContentBlock> = Vec::new();

    let flush_pending = |messages: &mut Vec<Message>, pending: &mut Vec<ContentBlock>| {
        if !pending.is_empty() {
            messages.push(Message::user(MessageContent::Blocks(std::mem::take(pending))));
        }
    };

    for message in request.messages {
        match message.role.as_str() {
            "system" | "developer" => {
                if let Some(content) = message.content {
                    system_parts.push(content_to_text(content));
                }
            }
            "tool" => {
                let tool_use_id = message.tool_call_id.unwrap_or_default();
                let content = message
                    .content
                    .map(wire_content_to_blocks)
                    .map(MessageContent::Blocks)
                    .unwrap_or(MessageContent::Text(String::new()));

                pending_tool_results.push(ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error: false,
                });
            }
            "assistant" => {
                flush_pending(&mut messages, &mut pending_tool_results);

                let mut blocks = Vec::new();

                if let Some(reasoning) = message.reasoning_content.as_deref().and_then(non_sentinel)
                    && !reasoning.is_empty()
                {
                    blocks.push(ContentBlock::Thinking {
                        thinking: reasoning.to_owned(),
                        signature: crate::thinking::global_store().get().unwrap_or_default(),
                    });
                }

                if let Some(content) = message.content {
                    blocks.extend(wire_content_to_blocks(content));
                }

                for call in message.tool_calls {
                    let input = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Object(Default::default()));
                    blocks.push(ContentBlock::ToolUse {
                        id: call.id,
                        name: call.function.name,
                        input,
                        signature: None,
                    });
                }

                messages.push(Message::assistant(MessageContent::Blocks(blocks)));
            }
            _ => {
                flush_pending(&mut messages, &mut pending_tool_results);
                let blocks = message.content.map(wire_content_to_blocks).unwrap_or_default();
                messages.push(Message {
                    role: Role::User,
                    content: MessageContent::Blocks(blocks),
                });
            }
        }
    }

    flush_pending(&mut messages, &mut pending_tool_results);

    let messages = crate::canonical::merge_consecutive_same_role(messages);

    CanonicalRequest {
        model: request.model,
        messages,
        system: if system_parts.is_empty() { None } else { Some(system_parts.join("\n")) },
        max_tokens: request.max_tokens.unwrap_or(CanonicalRequest::DEFAULT_MAX_TOKENS),
        temperature: request.temperature,
        top_p: request.top_p,
        stream: request.stream.unwrap_or(false),
        thinking: ThinkingRequest::default(),
        tools: request
            .tools
            .into_iter()
            .map(|tool| Tool {
                name: tool.function.name,
                description: tool.function.description,
                input_schema: tool.function.parameters,
            })
            .collect(),
    }
}

fn content_to_text(content: WireContent) -> String {
    match content {
        WireContent::Text(text) => text,
        WireContent::Parts(parts) => parts
            .into_iter()
            .filter_map(|part| match part {
                WirePart::Text { text } => Some(text),
                WirePart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

// ---- outbound (non-streaming response) --------------------------------

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: &'static str,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: ChatUsage,
}

#[derive(Debug, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ChatToolCall>,
}

#[derive(Debug, Serialize)]
pub struct ChatToolCall {
    pub id: String,
    pub r#type: &'static str,
    pub function: ChatFunctionCall,
}

#[derive(Debug, Serialize)]
pub struct ChatFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

fn finish_reason_str(reason: StopReason) -> &'static str {
    match reason {
        StopReason::ToolUse => "tool_calls",
        StopReason::MaxTokens => "length",
        StopReason::EndTurn => "stop",
    }
}

/// Converts a canonical response into the OpenAI Chat Completions wire shape.
pub fn from_canonical(response: CanonicalResponse) -> ChatResponse {
    let mut text = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();

    for block in response.content {
        match block {
            ContentBlock::Text { text: chunk } => {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&chunk);
            }
            ContentBlock::Thinking { thinking, .. } => {
                if !reasoning.is_empty() {
                    reasoning.push('\n');
                }
                reasoning.push_str(&thinking);
            }
            ContentBlock::ToolUse { id, name, input, .. } => tool_calls.push(ChatToolCall {
                id,
                r#type: "function",
                function: ChatFunctionCall {
                    name,
                    arguments: serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_owned()),
                },
            }),
            ContentBlock::ToolResult { .. } | ContentBlock::Image { .. } => {}
        }
    }

    ChatResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4()),
        object: "chat.completion",
        model: response.model,
        choices: vec![Choice {
            index: 0,
            message: ChatMessage {
                role: "assistant",
                content: if text.is_empty() { None } else { Some(text) },
                reasoning_content: if reasoning.is_empty() { None } else { Some(reasoning) },
                tool_calls,
            },
            finish_reason: finish_reason_str(response.stop_reason),
        }],
        usage: ChatUsage {
            prompt_tokens: response.usage.input_tokens,
            completion_tokens: response.usage.output_tokens,
            total_tokens: response.usage.input_tokens + response.usage.output_tokens,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_message_flushes_before_next_user_message() {
        let request = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![
                WireMessage {
                    role: "tool".into(),
                    content: Some(WireContent::Text("42".into())),
                    reasoning_content: None,
                    tool_calls: Vec::new(),
                    tool_call_id: Some("call_1".into()),
                },
                WireMessage {
                    role: "user".into(),
                    content: Some(WireContent::Text("thanks".into())),
                    reasoning_content: None,
                    tool_calls: Vec::new(),
                    tool_call_id: None,
                },
            ],
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream: None,
            tools: Vec::new(),
        };

        let canonical = to_canonical(request);
        assert_eq!(canonical.messages.len(), 1);
        assert!(matches!(canonical.messages[0].content, MessageContent::Blocks(ref blocks) if blocks.len() == 2));
    }

    #[test]
    fn sentinel_reasoning_is_ignored() {
        let request = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![WireMessage {
                role: "assistant".into(),
                content: Some(WireContent::Text("hi".into())),
                reasoning_content: Some("[undefined]".into()),
                tool_calls: Vec::new(),
                tool_call_id: None,
            }],
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream: None,
            tools: Vec::new(),
        };

        let canonical = to_canonical(request);
        let blocks = canonical.messages[0].content.clone().blocks();
        assert!(!blocks.iter().any(ContentBlock::is_thinking));
    }

    #[test]
    fn non_numeric_max_tokens_deserializes_instead_of_rejecting_the_request() {
        let request: ChatRequest = serde_json::from_str(
            r#"{"model": "gpt-4o", "messages": [], "max_tokens": "not a number"}"#,
        )
        .expect("non-numeric max_tokens should default rather than fail to parse");

        assert_eq!(request.max_tokens, None);
        assert_eq!(to_canonical(request).max_tokens, CanonicalRequest::DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn tool_call_argument_parse_failure_yields_empty_object() {
        let request = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![WireMessage {
                role: "assistant".into(),
                content: None,
                reasoning_content: None,
                tool_calls: vec![WireToolCall {
                    id: "call_1".into(),
                    function: WireFunctionCall {
                        name: "search".into(),
                        arguments: "not json".into(),
                    },
                }],
                tool_call_id: None,
            }],
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream: None,
            tools: Vec::new(),
        };

        let canonical = to_canonical(request);
        let blocks = canonical.messages[0].content.clone().blocks();
        assert!(matches!(&blocks[0], ContentBlock::ToolUse { input, .. } if input.as_object().unwrap().is_empty()));
    }
}
