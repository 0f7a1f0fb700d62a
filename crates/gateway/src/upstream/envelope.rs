//! Wire types for the `v1internal:streamGenerateContent` envelope
//! and the `loadCodeAssist` project-bootstrap call. Outbound types are
//! hand-built by `crate::transform`; inbound types are deserialized off the
//! SSE line iterator in `upstream::client`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---- outbound (request) ----------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamEnvelope {
    pub project: String,
    pub request_id: String,
    pub user_agent: String,
    pub request_type: String,
    pub model: String,
    pub request: UpstreamRequestBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamRequestBody {
    pub contents: Vec<UpstreamContent>,
    pub tool_config: ToolConfig,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamContent {
    pub role: String,
    pub parts: Vec<UpstreamPart>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl UpstreamPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: Value,
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: FunctionResponseBody,
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct FunctionResponseBody {
    pub result: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInstruction {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
    pub stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfigWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfigWire {
    pub include_thoughts: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    pub function_calling_config: FunctionCallingConfig,
}

#[derive(Debug, Serialize)]
pub struct FunctionCallingConfig {
    pub mode: String,
}

// ---- inbound (streamed response) --------------------------------------

/// A single upstream SSE `data:` line, either bare or wrapped in a
/// `{response, responseId}` envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged, rename_all = "camelCase")]
pub enum UpstreamLine {
    Wrapped {
        response: UpstreamResponseBody,
        #[serde(default)]
        response_id: Option<String>,
    },
    Bare(UpstreamResponseBody),
}

impl UpstreamLine {
    pub fn into_body(self) -> UpstreamResponseBody {
        match self {
            Self::Wrapped { response, .. } => response,
            Self::Bare(body) => body,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpstreamResponseBody {
    pub candidates: Vec<UpstreamCandidate>,
    pub usage_metadata: Option<UpstreamUsageMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpstreamCandidate {
    pub content: Option<UpstreamContentOut>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpstreamContentOut {
    pub parts: Vec<UpstreamPartOut>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpstreamPartOut {
    pub text: Option<String>,
    pub thought: Option<bool>,
    pub thought_signature: Option<String>,
    pub function_call: Option<UpstreamFunctionCallOut>,
    pub inline_data: Option<UpstreamInlineDataOut>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpstreamFunctionCallOut {
    pub name: String,
    pub args: Value,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpstreamInlineDataOut {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpstreamUsageMetadata {
    pub prompt_token_count: u32,
    pub candidates_token_count: u32,
    pub cached_content_token_count: u32,
}

// ---- OAuth2 / project bootstrap ----------------------------------------

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadCodeAssistRequest {
    pub metadata: LoadCodeAssistMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadCodeAssistMetadata {
    pub ide_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadCodeAssistResponse {
    pub cloudaicompanion_project: Option<String>,
}
