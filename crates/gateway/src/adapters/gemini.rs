//! Gemini v1beta ↔ canonical. Grounded on
//! `provider/google.rs`'s `Content`/`Part` wire shapes and
//! `adapters/anthropic.rs`'s conversion structure, generalized to Gemini's
//! `parts[]` tagged union and `thinkingConfig` negotiation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::{
    CanonicalRequest, CanonicalResponse, ContentBlock, Message, MessageContent, Role, StopReason, ThinkingRequest, Tool,
};

const DEFAULT_THINKING_BUDGET: u32 = 10_000;

// ---- inbound (request) ------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GeminiRequest {
    #[serde(default)]
    pub system_instruction: Option<WireSystemInstruction>,
    #[serde(default)]
    pub contents: Vec<WireContent>,
    #[serde(default)]
    pub generation_config: Option<WireGenerationConfig>,
    #[serde(default)]
    pub tools: Vec<WireToolGroup>,
}

#[derive(Debug, Deserialize)]
pub struct WireSystemInstruction {
    #[serde(default)]
    pub parts: Vec<WireTextPart>,
}

#[derive(Debug, Deserialize)]
pub struct WireTextPart {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct WireContent {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<WirePart>,
}

fn default_role() -> String {
    "user".to_owned()
}

#[derive(Debug, Deserialize)]
pub struct WirePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub thought: bool,
    #[serde(rename = "thoughtSignature", default)]
    pub thought_signature: Option<String>,
    #[serde(rename = "functionCall", default)]
    pub function_call: Option<WireFunctionCall>,
    #[serde(rename = "functionResponse", default)]
    pub function_response: Option<WireFunctionResponse>,
    #[serde(rename = "inlineData", default)]
    pub inline_data: Option<WireInlineData>,
}

#[derive(Debug, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireFunctionResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub response: WireFunctionResult,
}

#[derive(Debug, Deserialize)]
pub struct WireFunctionResult {
    #[serde(default)]
    pub result: Value,
}

#[derive(Debug, Deserialize)]
pub struct WireInlineData {
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct WireGenerationConfig {
    #[serde(rename = "maxOutputTokens", default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(rename = "topP", default)]
    pub top_p: Option<f32>,
    #[serde(rename = "thinkingConfig", default)]
    pub thinking_config: Option<WireThinkingConfig>,
}

#[derive(Debug, Deserialize)]
pub struct WireThinkingConfig {
    #[serde(rename = "includeThoughts", default)]
    pub include_thoughts: bool,
    #[serde(rename = "thinkingBudget", default)]
    pub thinking_budget: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WireToolGroup {
    #[serde(rename = "googleSearch", default)]
    pub google_search: Option<Value>,
    #[serde(rename = "functionDeclarations", default)]
    pub function_declarations: Vec<WireFunctionDeclaration>,
}

#[derive(Debug, Deserialize)]
pub struct WireFunctionDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

fn wire_part_to_block(part: WirePart) -> Option<ContentBlock> {
    if let Some(call) = part.function_call {
        return Some(ContentBlock::ToolUse {
            id: call.id.unwrap_or_else(|| call.name.clone()),
            name: call.name,
            input: call.args,
            signature: part.thought_signature,
        });
    }

    if let Some(response) = part.function_response {
        return Some(ContentBlock::ToolResult {
            tool_use_id: response.id.unwrap_or_default(),
            content: MessageContent::Text(response.response.result.to_string()),
            is_error: false,
        });
    }

    if let Some(inline) = part.inline_data {
        return Some(ContentBlock::Image {
            media_type: inline.mime_type,
            data: inline.data,
        });
    }

    let text = part.text.unwrap_or_default();

    if part.thought {
        return Some(ContentBlock::Thinking {
            thinking: text,
            signature: part.thought_signature.unwrap_or_default(),
        });
    }

    Some(ContentBlock::Text { text })
}

/// Converts a Gemini `generateContent`/`streamGenerateContent` request into
/// the canonical representation.
pub fn to_canonical(request: GeminiRequest) -> CanonicalRequest {
    let system = request
        .system_instruction
        .map(|instruction| instruction.parts.into_iter().map(|p| p.text).collect::<Vec<_>>().join("\n"))
        .filter(|text| !text.is_empty());

    let messages = request
        .contents
        .into_iter()
        .map(|content| {
            let blocks: Vec<ContentBlock> = content.parts.into_iter().filter_map(wire_part_to_block).collect();
            let forced_user = blocks.iter().any(|b| matches!(b, ContentBlock::ToolResult { .. }));

            let role = if content.role == "model" && !forced_user { Role::Assistant } else { Role::User };

            Message {
                role,
                content: MessageContent::Blocks(blocks),
            }
        })
        .collect();

    let messages = crate::canonical::merge_consecutive_same_role(messages);

    let (max_tokens, temperature, top_p, thinking) = match request.generation_config {
        Some(config) => {
            let thinking = match config.thinking_config {
                Some(tc) if tc.include_thoughts => ThinkingRequest {
                    enabled: true,
                    budget_tokens: Some(tc.thinking_budget.unwrap_or(DEFAULT_THINKING_BUDGET)),
                },
                _ => ThinkingRequest::default(),
            };

            (config.max_output_tokens.unwrap_or(CanonicalRequest::DEFAULT_MAX_TOKENS), config.temperature, config.top_p, thinking)
        }
        None => (CanonicalRequest::DEFAULT_MAX_TOKENS, None, None, ThinkingRequest::default()),
    };

    let mut tools = Vec::new();
    for group in request.tools {
        if group.google_search.is_some() {
            tools.push(Tool {
                name: "web_search".to_owned(),
                description: None,
                input_schema: Value::Object(Default::default()),
            });
        }

        for declaration in group.function_declarations {
            tools.push(Tool {
                name: declaration.name,
                description: declaration.description,
                input_schema: declaration.parameters,
            });
        }
    }

    CanonicalRequest {
        model: String::new(),
        messages,
        system,
        max_tokens,
        temperature,
        top_p,
        stream: false,
        thinking,
        tools,
    }
}

// ---- outbound (non-streaming response) --------------------------------

#[derive(Debug, Serialize)]
pub struct GeminiResponse {
    pub candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    pub usage_metadata: UsageMetadata,
    #[serde(rename = "modelVersion")]
    pub model_version: String,
}

#[derive(Debug, Serialize)]
pub struct Candidate {
    pub content: OutContent,
    #[serde(rename = "finishReason")]
    pub finish_reason: &'static str,
    pub index: u32,
}

#[derive(Debug, Serialize)]
pub struct OutContent {
    pub role: &'static str,
    pub parts: Vec<OutPart>,
}

#[derive(Debug, Serialize)]
pub struct OutPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub thought: bool,
    #[serde(rename = "functionCall", skip_serializing_if = "Option::is_none")]
    pub function_call: Option<OutFunctionCall>,
}

#[derive(Debug, Serialize)]
pub struct OutFunctionCall {
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Serialize)]
pub struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    pub prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount")]
    pub candidates_token_count: u32,
    #[serde(rename = "totalTokenCount")]
    pub total_token_count: u32,
    #[serde(rename = "cachedContentTokenCount", skip_serializing_if = "Option::is_none")]
    pub cached_content_token_count: Option<u32>,
}

fn finish_reason_str(reason: StopReason) -> &'static str {
    match reason {
        StopReason::ToolUse => "TOOL_USE",
        StopReason::MaxTokens => "MAX_TOKENS",
        StopReason::EndTurn => "STOP",
    }
}

/// Converts a canonical response into the Gemini `generateContent` wire
/// shape.
pub fn from_canonical(response: CanonicalResponse) -> GeminiResponse {
    let parts = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(OutPart {
                text: Some(text),
                thought: false,
                function_call: None,
            }),
            ContentBlock::Thinking { thinking, .. } => Some(OutPart {
                text: Some(thinking),
                thought: true,
                function_call: None,
            }),
            ContentBlock::ToolUse { name, input, .. } => Some(OutPart {
                text: None,
                thought: false,
                function_call: Some(OutFunctionCall { name, args: input }),
            }),
            ContentBlock::ToolResult { .. } | ContentBlock::Image { .. } => None,
        })
        .collect();

    let input_tokens = response.usage.input_tokens + response.usage.cache_read_input_tokens;
    let total_tokens = input_tokens + response.usage.output_tokens;

    GeminiResponse {
        candidates: vec![Candidate {
            content: OutContent { role: "model", parts },
            finish_reason: finish_reason_str(response.stop_reason),
            index: 0,
        }],
        usage_metadata: UsageMetadata {
            prompt_token_count: input_tokens,
            candidates_token_count: response.usage.output_tokens,
            total_token_count: total_tokens,
            cached_content_token_count: if response.usage.cache_read_input_tokens > 0 {
                Some(response.usage.cache_read_input_tokens)
            } else {
                None
            },
        },
        model_version: response.model,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_forces_user_role_even_for_model_turn() {
        let request = GeminiRequest {
            system_instruction: None,
            contents: vec![WireContent {
                role: "model".into(),
                parts: vec![WirePart {
                    text: None,
                    thought: false,
                    thought_signature: None,
                    function_call: None,
                    function_response: Some(WireFunctionResponse {
                        id: Some("1".into()),
                        response: WireFunctionResult { result: Value::String("ok".into()) },
                    }),
                    inline_data: None,
                }],
            }],
            generation_config: None,
            tools: Vec::new(),
        };

        let canonical = to_canonical(request);
        assert_eq!(canonical.messages[0].role, Role::User);
    }

    #[test]
    fn thinking_config_defaults_budget_when_absent() {
        let request = GeminiRequest {
            system_instruction: None,
            contents: Vec::new(),
            generation_config: Some(WireGenerationConfig {
                max_output_tokens: None,
                temperature: None,
                top_p: None,
                thinking_config: Some(WireThinkingConfig {
                    include_thoughts: true,
                    thinking_budget: None,
                }),
            }),
            tools: Vec::new(),
        };

        let canonical = to_canonical(request);
        assert!(canonical.thinking.enabled);
        assert_eq!(canonical.thinking.budget_tokens, Some(DEFAULT_THINKING_BUDGET));
    }

    #[test]
    fn google_search_tool_flattens_to_web_search() {
        let request = GeminiRequest {
            system_instruction: None,
            contents: Vec::new(),
            generation_config: None,
            tools: vec![WireToolGroup {
                google_search: Some(Value::Object(Default::default())),
                function_declarations: Vec::new(),
            }],
        };

        let canonical = to_canonical(request);
        assert_eq!(canonical.tools[0].name, "web_search");
    }
}
