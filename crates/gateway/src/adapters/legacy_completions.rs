//! OpenAI Legacy Completions → canonical. Grounded on
//! `adapters/openai_chat.rs`'s inbound structure, reduced to the single-turn
//! shape this older dialect exposes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canonical::{CanonicalRequest, CanonicalResponse, ContentBlock, Message, MessageContent, ThinkingRequest};

#[derive(Debug, Deserialize)]
pub struct CompletionsRequest {
    pub model: String,
    pub prompt: WirePrompt,
    #[serde(default, deserialize_with = "super::lenient::max_tokens")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WirePrompt {
    Text(String),
    Lines(Vec<String>),
}

impl WirePrompt {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Lines(lines) => lines.join("\n"),
        }
    }
}

/// Converts a legacy Completions request into the canonical representation.
/// The prompt, string or list, collapses to a single user message.
pub fn to_canonical(request: CompletionsRequest) -> CanonicalRequest {
    CanonicalRequest {
        model: request.model,
        messages: vec![Message::user(MessageContent::Text(request.prompt.into_text()))],
        system: None,
        max_tokens: request.max_tokens.unwrap_or(CanonicalRequest::DEFAULT_MAX_TOKENS),
        temperature: request.temperature,
        top_p: request.top_p,
        stream: request.stream.unwrap_or(false),
        thinking: ThinkingRequest::default(),
        tools: Vec::new(),
    }
}

#[derive(Debug, Serialize)]
pub struct CompletionsResponse {
    pub id: String,
    pub object: &'static str,
    pub model: String,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Serialize)]
pub struct Choice {
    pub text: String,
    pub index: u32,
    pub finish_reason: &'static str,
}

/// Converts a canonical response into the legacy Completions wire shape,
/// concatenating all text blocks.
pub fn from_canonical(response: CanonicalResponse) -> CompletionsResponse {
    let text = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("");

    CompletionsResponse {
        id: format!("cmpl-{}", Uuid::new_v4()),
        object: "text_completion",
        model: response.model,
        choices: vec![Choice {
            text,
            index: 0,
            finish_reason: "stop",
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_prompt_joins_with_newline() {
        let request = CompletionsRequest {
            model: "gpt-3.5-turbo-instruct".into(),
            prompt: WirePrompt::Lines(vec!["a".into(), "b".into()]),
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream: None,
        };

        let canonical = to_canonical(request);
        assert_eq!(canonical.messages[0].content.as_text(), "a\nb");
    }

    #[test]
    fn non_numeric_max_tokens_deserializes_instead_of_rejecting_the_request() {
        let request: CompletionsRequest =
            serde_json::from_str(r#"{"model": "gpt-3.5-turbo-instruct", "prompt": "hi", "max_tokens": -1}"#)
                .expect("non-numeric max_tokens should default rather than fail to parse");

        assert_eq!(request.max_tokens, None);
        assert_eq!(to_canonical(request).max_tokens, CanonicalRequest::DEFAULT_MAX_TOKENS);
    }
}
