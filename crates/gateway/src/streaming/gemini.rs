//! Gemini v1beta streaming. The only dialect matching the
//! upstream wire shape directly: each upstream SSE line is unwrapped from its
//! `{response, responseId}` envelope if present, stamped with the resolved
//! `modelVersion`, and re-emitted verbatim. No state machine is needed.

use serde::Serialize;

use crate::upstream::envelope::{UpstreamResponseBody, UpstreamUsageMetadata};

#[derive(Debug, Clone, Serialize)]
pub struct GeminiStreamChunk {
    pub candidates: Vec<PassthroughCandidate>,
    #[serde(rename = "usageMetadata", skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UpstreamUsageMetadata>,
    #[serde(rename = "modelVersion")]
    pub model_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassthroughCandidate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<PassthroughContent>,
    #[serde(rename = "finishReason", skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassthroughContent {
    pub parts: Vec<PassthroughPart>,
    pub role: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PassthroughPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub thought: bool,
    #[serde(rename = "thoughtSignature", skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
    #[serde(rename = "functionCall", skip_serializing_if = "Option::is_none")]
    pub function_call: Option<serde_json::Value>,
}

/// Stamps the resolved model onto an upstream body for re-emission as a
/// Gemini `streamGenerateContent` chunk, dropping inline image data (not
/// produced by this upstream in model-output position).
pub fn to_gemini_chunk(body: UpstreamResponseBody, model_version: &str) -> GeminiStreamChunk {
    let candidates = body
        .candidates
        .into_iter()
        .map(|candidate| PassthroughCandidate {
            content: candidate.content.map(|content| PassthroughContent {
                role: "model",
                parts: content
                    .parts
                    .into_iter()
                    .map(|part| PassthroughPart {
                        text: part.text,
                        thought: part.thought.unwrap_or(false),
                        thought_signature: part.thought_signature,
                        function_call: part.function_call.map(|call| {
                            serde_json::json!({"name": call.name, "args": call.args})
                        }),
                    })
                    .collect(),
            }),
            finish_reason: candidate.finish_reason,
        })
        .collect();

    GeminiStreamChunk {
        candidates,
        usage_metadata: body.usage_metadata,
        model_version: model_version.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::envelope::{UpstreamCandidate, UpstreamContentOut, UpstreamPartOut};

    #[test]
    fn stamps_model_version() {
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

        let chunk = to_gemini_chunk(body, "gemini-2.5-pro");
        assert_eq!(chunk.model_version, "gemini-2.5-pro");
        assert_eq!(chunk.candidates[0].content.as_ref().unwrap().parts[0].text.as_deref(), Some("hi"));
    }
}
