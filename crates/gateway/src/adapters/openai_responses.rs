//! OpenAI Responses ↔ canonical. Grounded on
//! `adapters/openai_chat.rs`'s accumulate-then-emit structure, generalized
//! to the Responses API's flat `input[]` item list instead of a role-tagged
//! message array.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::canonical::{CanonicalRequest, CanonicalResponse, ContentBlock, Message, MessageContent, Role, StopReason, ThinkingRequest, Tool};

const REASONING_SUMMARY_CAP: usize = 500;

// ---- inbound (request) ------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ResponsesRequest {
    pub model: String,
    #[serde(default)]
    pub input: Option<WireInput>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default, deserialize_with = "super::lenient::max_tokens")]
    pub max_output_tokens: Option<u32>,
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
#[serde(untagged)]
pub enum WireInput {
    Text(String),
    Items(Vec<WireItem>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireItem {
    Message {
        #[serde(default = "default_role")]
        role: String,
        content: Vec<WireInnerContent>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        #[serde(default)]
        output: String,
    },
    Reasoning {},
}

fn default_role() -> String {
    "user".to_owned()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireInnerContent {
    InputText { text: String },
    OutputText { text: String },
    InputImage { image_url: String },
    ToolResult { text: String },
}

#[derive(Debug, Deserialize)]
pub struct WireTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

/// Converts an OpenAI Responses request into the canonical representation.
/// `reasoning` items are dropped; `instructions`, if present, prepends the
/// derived system text.
pub fn to_canonical(request: ResponsesRequest) -> CanonicalRequest {
    let mut messages = Vec::new();

    match request.input {
        Some(WireInput::Text(text)) => messages.push(Message::user(MessageContent::Text(text))),
        Some(WireInput::Items(items)) => {
            for item in items {
                match item {
                    WireItem::Message { role, content } => {
                        let blocks = content
                            .into_iter()
                            .map(|inner| match inner {
                                WireInnerContent::InputText { text } | WireInnerContent::OutputText { text } => ContentBlock::text(text),
                                WireInnerContent::InputImage { image_url } => ContentBlock::Image {
                                    media_type: "application/octet-stream".to_owned(),
                                    data: image_url,
                                },
                                WireInnerContent::ToolResult { text } => ContentBlock::text(text),
                            })
                            .collect();

                        let role = if role == "assistant" { Role::Assistant } else { Role::User };
                        messages.push(Message {
                            role,
                            content: MessageContent::Blocks(blocks),
                        });
                    }
                    WireItem::FunctionCall { call_id, name, arguments } => {
                        let input = serde_json::from_str(&arguments).unwrap_or(Value::Object(Default::default()));
                        messages.push(Message::assistant(MessageContent::Blocks(vec![ContentBlock::ToolUse {
                            id: call_id,
                            name,
                            input,
                            signature: None,
                        }])));
                    }
                    WireItem::FunctionCallOutput { call_id, output } => {
                        messages.push(Message::user(MessageContent::Blocks(vec![ContentBlock::ToolResult {
                            tool_use_id: call_id,
                            content: MessageContent::Text(output),
                            is_error: false,
                        }])));
                    }
                    WireItem::Reasoning {} => {}
                }
            }
        }
        None => {}
    }

    let messages = crate::canonical::merge_consecutive_same_role(messages);

    CanonicalRequest {
        model: request.model,
        messages,
        system: request.instructions,
        max_tokens: request.max_output_tokens.unwrap_or(CanonicalRequest::DEFAULT_MAX_TOKENS),
        temperature: request.temperature,
        top_p: request.top_p,
        stream: request.stream.unwrap_or(false),
        thinking: ThinkingRequest::default(),
        tools: request
            .tools
            .into_iter()
            .map(|tool| Tool {
                name: tool.name,
                description: tool.description,
                input_schema: tool.parameters,
            })
            .collect(),
    }
}

// ---- outbound (non-streaming response) --------------------------------

#[derive(Debug, Serialize)]
pub struct ResponsesResponse {
    pub id: String,
    pub object: &'static str,
    pub model: String,
    pub status: &'static str,
    pub output: Vec<OutputItem>,
    pub usage: ResponsesUsage,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Reasoning { id: String, summary: Vec<SummaryPart> },
    Message { id: String, role: &'static str, content: Vec<ContentPart> },
    FunctionCall { id: String, call_id: String, name: String, arguments: String },
}

#[derive(Debug, Serialize)]
pub struct SummaryPart {
    pub r#type: &'static str,
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    OutputText { text: String },
}

#[derive(Debug, Serialize)]
pub struct ResponsesUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

fn truncate_summary(text: &str) -> String {
    if text.chars().count() > REASONING_SUMMARY_CAP {
        let truncated: String = text.chars().take(REASONING_SUMMARY_CAP).collect();
        format!("{truncated}…")
    } else {
        text.to_owned()
    }
}

/// Converts a canonical response into the OpenAI Responses wire shape.
/// Emits items in arrival order per Open Question (b): the reasoning item,
/// when present, is emitted first only because thinking always precedes
/// other content in the canonical block order, not by forced reordering.
pub fn from_canonical(response: CanonicalResponse) -> ResponsesResponse {
    let mut output = Vec::new();
    let mut reasoning_summary = String::new();
    let mut text_parts = Vec::new();

    for block in &response.content {
        match block {
            ContentBlock::Thinking { thinking, .. } => {
                if !reasoning_summary.is_empty() {
                    reasoning_summary.push('\n');
                }
                reasoning_summary.push_str(thinking);
            }
            ContentBlock::Text { text } => text_parts.push(text.clone()),
            _ => {}
        }
    }

    if !reasoning_summary.is_empty() {
        output.push(OutputItem::Reasoning {
            id: format!("rs_{}", Uuid::new_v4()),
            summary: vec![SummaryPart {
                r#type: "summary_text",
                text: truncate_summary(&reasoning_summary),
            }],
        });
    }

    if !text_parts.is_empty() {
        output.push(OutputItem::Message {
            id: format!("msg_{}", Uuid::new_v4()),
            role: "assistant",
            content: text_parts.into_iter().map(|text| ContentPart::OutputText { text }).collect(),
        });
    }

    for block in response.content {
        if let ContentBlock::ToolUse { id, name, input, .. } = block {
            output.push(OutputItem::FunctionCall {
                id: format!("fc_{}", Uuid::new_v4()),
                call_id: id,
                name,
                arguments: serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_owned()),
            });
        }
    }

    let status = if response.stop_reason == StopReason::MaxTokens { "incomplete" } else { "completed" };

    ResponsesResponse {
        id: format!("resp_{}", Uuid::new_v4()),
        object: "response",
        model: response.model,
        status,
        output,
        usage: ResponsesUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            total_tokens: response.usage.input_tokens + response.usage.output_tokens,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::Usage;

    #[test]
    fn reasoning_item_dropped_on_inbound() {
        let request = ResponsesRequest {
            model: "claude-sonnet-4-5".into(),
            input: Some(WireInput::Items(vec![WireItem::Reasoning {}])),
            instructions: None,
            max_output_tokens: None,
            temperature: None,
            top_p: None,
            stream: None,
            tools: Vec::new(),
        };

        let canonical = to_canonical(request);
        assert!(canonical.messages.is_empty());
    }

    #[test]
    fn summary_truncates_past_cap_with_ellipsis() {
        let long_text = "a".repeat(600);
        let truncated = truncate_summary(&long_text);
        assert_eq!(truncated.chars().count(), REASONING_SUMMARY_CAP + 1);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn max_tokens_stop_reason_downgrades_status_to_incomplete() {
        let response = CanonicalResponse {
            model: "claude-sonnet-4-5".into(),
            content: vec![ContentBlock::text("partial")],
            stop_reason: StopReason::MaxTokens,
            usage: Usage::default(),
        };

        let wire = from_canonical(response);
        assert_eq!(wire.status, "incomplete");
    }

    #[test]
    fn non_numeric_max_output_tokens_deserializes_instead_of_rejecting_the_request() {
        let request: ResponsesRequest =
            serde_json::from_str(r#"{"model": "claude-sonnet-4-5", "max_output_tokens": 4096.5}"#)
                .expect("non-numeric max_output_tokens should default rather than fail to parse");

        assert_eq!(request.max_output_tokens, None);
        assert_eq!(to_canonical(request).max_tokens, CanonicalRequest::DEFAULT_MAX_TOKENS);
    }
}
