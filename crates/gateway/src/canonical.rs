//! The canonical (Anthropic-shaped) intermediate representation every dialect
//! adapter converts to and from, and the handful of cross-cutting rules
//! (merge-adjacency, sentinel filtering) that apply to it regardless of
//! which dialect produced or will consume it.

use serde_json::Value;

/// A message's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One block inside a message's content list.
#[derive(Debug, Clone)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        signature: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
        signature: Option<String>,
    },
    ToolResult {
        tool_use_id: String,
        content: MessageContent,
        is_error: bool,
    },
    Image {
        media_type: String,
        data: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn is_thinking(&self) -> bool {
        matches!(self, Self::Thinking { .. })
    }

    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse { .. })
    }
}

/// A message's content: either a bare string or an ordered block list.
/// Kept as a tagged union so every
/// adapter consumes and produces exactly this layer, never raw JSON.
#[derive(Debug, Clone)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    pub fn blocks(self) -> Vec<ContentBlock> {
        match self {
            Self::Text(text) => vec![ContentBlock::text(text)],
            Self::Blocks(blocks) => blocks,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.clone()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Blocks(blocks) => blocks.is_empty(),
        }
    }
}

/// A single turn in the canonical message list.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(content: MessageContent) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    pub fn assistant(content: MessageContent) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }
}

/// Chain-of-thought negotiation requested by the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThinkingRequest {
    pub enabled: bool,
    pub budget_tokens: Option<u32>,
}

/// A tool definition with an already-sanitized JSON-Schema.
#[derive(Debug, Clone)]
pub struct Tool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// The internal lingua franca every adapter translates to and from.
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub system: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stream: bool,
    pub thinking: ThinkingRequest,
    pub tools: Vec<Tool>,
}

impl CanonicalRequest {
    pub const DEFAULT_MAX_TOKENS: u32 = 4096;
}

/// Token accounting echoed back from upstream usage metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_read_input_tokens: u32,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
}

/// A fully assembled (non-streaming) canonical response, produced by either
/// the non-streaming aggregator or by draining the streaming state machine.
#[derive(Debug, Clone)]
pub struct CanonicalResponse {
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

/// Client-injected sentinel strings that must be treated as absent
/// everywhere a dialect adapter reads a string field.
pub fn is_sentinel(value: &str) -> bool {
    matches!(value, "[undefined]" | "undefined" | "null" | "[null]" | "")
}

/// `None` for sentinel/empty values, `Some(value)` otherwise.
pub fn non_sentinel(value: &str) -> Option<&str> {
    if is_sentinel(value) { None } else { Some(value) }
}

/// Merges consecutive same-role messages into one, promoting bare strings to
/// single-text-block lists when a merge occurs.
pub fn merge_consecutive_same_role(messages: Vec<Message>) -> Vec<Message> {
    let mut merged: Vec<Message> = Vec::with_capacity(messages.len());

    for message in messages {
        match merged.last_mut() {
            Some(last) if last.role == message.role => {
                let mut blocks = std::mem::replace(&mut last.content, MessageContent::Blocks(Vec::new())).blocks();
                blocks.extend(message.content.blocks());
                last.content = MessageContent::Blocks(blocks);
            }
            _ => merged.push(message),
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_values_are_filtered() {
        assert_eq!(non_sentinel("[undefined]"), None);
        assert_eq!(non_sentinel("undefined"), None);
        assert_eq!(non_sentinel("null"), None);
        assert_eq!(non_sentinel("[null]"), None);
        assert_eq!(non_sentinel(""), None);
        assert_eq!(non_sentinel("hello"), Some("hello"));
    }

    #[test]
    fn merge_adjacency_collapses_same_role_runs() {
        let messages = vec![
            Message::user(MessageContent::Text("a".into())),
            Message::user(MessageContent::Text("b".into())),
            Message::assistant(MessageContent::Text("c".into())),
        ];

        let merged = merge_consecutive_same_role(messages);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].content.blocks().len(), 2);
    }
}
