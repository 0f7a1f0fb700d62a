//! Anthropic Messages ↔ canonical. This is the
//! canonical dialect itself, so translation in both directions is close to
//! an identity mapping over the wire JSON shape). Grounded on
//! `protocol/anthropic/messages/*`'s tagged-union content block shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::canonical::{
    CanonicalRequest, CanonicalResponse, ContentBlock, Message, MessageContent, Role, StopReason, ThinkingRequest, Tool,
};

// ---- inbound (request) ------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub system: Option<WireSystem>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub thinking: Option<WireThinking>,
    #[serde(default)]
    pub tools: Vec<WireTool>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireSystem {
    Text(String),
    Blocks(Vec<WireTextOnly>),
}

#[derive(Debug, Deserialize)]
pub struct WireTextOnly {
    pub text: String,
}

impl WireSystem {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Blocks(blocks) => blocks.into_iter().map(|b| b.text).collect::<Vec<_>>().join("\n"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: WireContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Blocks(Vec<WireBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
        #[serde(default)]
        signature: Option<String>,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<WireContent>,
        #[serde(default)]
        is_error: bool,
    },
    Image {
        source: WireImageSource,
    },
}

#[derive(Debug, Deserialize)]
pub struct WireImageSource {
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct WireThinking {
    #[serde(default)]
    pub budget_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WireTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

fn wire_content_to_canonical(content: WireContent) -> MessageContent {
    match content {
        WireContent::Text(text) => MessageContent::Text(text),
        WireContent::Blocks(blocks) => MessageContent::Blocks(blocks.into_iter().map(wire_block_to_canonical).collect()),
    }
}

fn wire_block_to_canonical(block: WireBlock) -> ContentBlock {
    match block {
        WireBlock::Text { text } => ContentBlock::Text { text },
        WireBlock::Thinking { thinking, signature } => ContentBlock::Thinking { thinking, signature },
        WireBlock::ToolUse {
            id,
            name,
            input,
            signature,
        } => ContentBlock::ToolUse {
            id,
            name,
            input,
            signature,
        },
        WireBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => ContentBlock::ToolResult {
            tool_use_id,
            content: content.map(wire_content_to_canonical).unwrap_or(MessageContent::Text(String::new())),
            is_error,
        },
        WireBlock::Image { source } => ContentBlock::Image {
            media_type: source.media_type,
            data: source.data,
        },
    }
}

/// Converts an Anthropic Messages request into the canonical representation.
pub fn to_canonical(request: AnthropicRequest) -> CanonicalRequest {
    let messages = request
        .messages
        .into_iter()
        .map(|message| {
            let role = if message.role == "assistant" { Role::Assistant } else { Role::User };
            Message {
                role,
                content: wire_content_to_canonical(message.content),
            }
        })
        .collect();

    let messages = crate::canonical::merge_consecutive_same_role(messages);

    CanonicalRequest {
        model: request.model,
        messages,
        system: request.system.map(WireSystem::into_text),
        max_tokens: request.max_tokens.unwrap_or(CanonicalRequest::DEFAULT_MAX_TOKENS),
        temperature: request.temperature,
        top_p: request.top_p,
        stream: request.stream.unwrap_or(false),
        thinking: ThinkingRequest {
            enabled: request.thinking.is_some(),
            budget_tokens: request.thinking.and_then(|t| t.budget_tokens),
        },
        tools: request
            .tools
            .into_iter()
            .map(|tool| Tool {
                name: tool.name,
                description: tool.description,
                input_schema: tool.input_schema,
            })
            .collect(),
    }
}

// ---- outbound (non-streaming response) --------------------------------

#[derive(Debug, Serialize)]
pub struct AnthropicResponse {
    pub id: String,
    pub r#type: &'static str,
    pub role: &'static str,
    pub content: Vec<OutBlock>,
    pub model: String,
    pub stop_reason: &'static str,
    pub stop_sequence: Option<String>,
    pub usage: OutUsage,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutBlock {
    Text { text: String },
    Thinking { thinking: String, signature: String },
    ToolUse { id: String, name: String, input: Value },
}

#[derive(Debug, Serialize)]
pub struct OutUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_read_input_tokens: u32,
}

fn stop_reason_str(reason: StopReason) -> &'static str {
    match reason {
        StopReason::ToolUse => "tool_use",
        StopReason::MaxTokens => "max_tokens",
        StopReason::EndTurn => "end_turn",
    }
}

/// Converts a canonical response into the Anthropic Messages wire shape.
pub fn from_canonical(response: CanonicalResponse) -> AnthropicResponse {
    let content = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(OutBlock::Text { text }),
            ContentBlock::Thinking { thinking, signature } => Some(OutBlock::Thinking { thinking, signature }),
            ContentBlock::ToolUse { id, name, input, .. } => Some(OutBlock::ToolUse { id, name, input }),
            ContentBlock::ToolResult { .. } | ContentBlock::Image { .. } => None,
        })
        .collect();

    AnthropicResponse {
        id: format!("msg_{}", Uuid::new_v4()),
        r#type: "message",
        role: "assistant",
        content,
        model: response.model,
        stop_reason: stop_reason_str(response.stop_reason),
        stop_sequence: None,
        usage: OutUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            cache_read_input_tokens: response.usage.cache_read_input_tokens,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_content_round_trips_to_single_text_block() {
        let request = AnthropicRequest {
            model: "claude-sonnet-4-5".into(),
            messages: vec![WireMessage {
                role: "user".into(),
                content: WireContent::Text("hi".into()),
            }],
            system: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream: None,
            thinking: None,
            tools: Vec::new(),
        };

        let canonical = to_canonical(request);
        assert_eq!(canonical.max_tokens, CanonicalRequest::DEFAULT_MAX_TOKENS);
        assert_eq!(canonical.messages[0].content.as_text(), "hi");
    }

    #[test]
    fn consecutive_same_role_messages_merge() {
        let request = AnthropicRequest {
            model: "claude-sonnet-4-5".into(),
            messages: vec![
                WireMessage {
                    role: "user".into(),
                    content: WireContent::Text("a".into()),
                },
                WireMessage {
                    role: "user".into(),
                    content: WireContent::Text("b".into()),
                },
            ],
            system: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream: None,
            thinking: None,
            tools: Vec::new(),
        };

        let canonical = to_canonical(request);
        assert_eq!(canonical.messages.len(), 1);
    }
}
