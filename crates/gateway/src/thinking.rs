//! Validates, repairs, and when necessary downgrades chain-of-thought
//! blocks, and owns the process-wide "longest signature wins" store. The
//! store is a deliberate explicit mutable cell behind a mutex
//! rather than threaded through request context, because the
//! upstream protocol intentionally carries signatures across independent
//! HTTP requests.

use std::sync::{Mutex, OnceLock};

use crate::canonical::{ContentBlock, Message, MessageContent, Role};

/// Minimum length for a signature to be considered valid on its own.
const MIN_VALID_SIGNATURE_LEN: usize = 50;

/// The sentinel signature Gemini-family models accept in lieu of a real one.
pub const DUMMY_SIGNATURE: &str = "skip_thought_signature_validator";

/// A thinking block's signature is valid when it is long enough on its own,
/// or when it rides on an otherwise-empty thinking block (the "trailing
/// signature" carrier case).
pub fn is_valid_signature(signature: &str, thinking_text: &str) -> bool {
    signature.len() >= MIN_VALID_SIGNATURE_LEN || (thinking_text.is_empty() && !signature.is_empty())
}

/// Process-wide store of the longest signature ever observed.
pub struct SignatureStore {
    current: Mutex<Option<String>>,
}

impl SignatureStore {
    pub(crate) fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// Replaces the stored value iff `signature` is strictly longer.
    pub fn store(&self, signature: &str) {
        if signature.is_empty() {
            return;
        }

        let mut current = self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let should_replace = current.as_ref().is_none_or(|existing| signature.len() > existing.len());

        if should_replace {
            *current = Some(signature.to_owned());
        }
    }

    /// Returns the current value, if any.
    pub fn get(&self) -> Option<String> {
        self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    /// Clears the store. Available for tests; unused in steady-state
    /// operation.
    #[cfg(test)]
    pub fn clear(&self) {
        *self.current.lock().unwrap() = None;
    }
}

/// The process-wide signature store.
pub fn global_store() -> &'static SignatureStore {
    static STORE: OnceLock<SignatureStore> = OnceLock::new();
    STORE.get_or_init(SignatureStore::new)
}

/// Filters and repairs an assistant message's content list in place,
/// following the validation/repair/downgrade rules below.
pub fn filter_assistant_content(blocks: Vec<ContentBlock>, store: &SignatureStore) -> Vec<ContentBlock> {
    let mut filtered = Vec::with_capacity(blocks.len());

    for block in blocks {
        match block {
            ContentBlock::Thinking { thinking, signature } if is_valid_signature(&signature, &thinking) => {
                filtered.push(ContentBlock::Thinking { thinking, signature });
            }
            ContentBlock::Thinking { thinking, signature: _ } => match store.get() {
                Some(repaired) => filtered.push(ContentBlock::Thinking {
                    thinking,
                    signature: repaired,
                }),
                None if !thinking.is_empty() => filtered.push(ContentBlock::text(thinking)),
                None => {}
            },
            other => filtered.push(other),
        }
    }

    if filtered.is_empty() {
        filtered.push(ContentBlock::text(""));
    }

    filtered
}

/// True when the most recent assistant message contains `tool_use` but no
/// `thinking` block — in that case thinking must be forcibly disabled for
/// the next request, because the upstream rejects a thinking-enabled
/// continuation of a non-thinking flow.
pub fn last_assistant_requires_thinking_disabled(messages: &[Message]) -> bool {
    let Some(last_assistant) = messages.iter().rev().find(|message| message.role == Role::Assistant) else {
        return false;
    };

    let MessageContent::Blocks(blocks) = &last_assistant.content else {
        return false;
    };

    let has_tool_use = blocks.iter().any(ContentBlock::is_tool_use);
    let has_thinking = blocks.iter().any(ContentBlock::is_thinking);

    has_tool_use && !has_thinking
}

/// Whether a usable signature exists to satisfy the upstream's requirement
/// that every `functionCall` part carry one: either the global store is
/// populated, or the history itself contains a valid thinking signature.
pub fn signature_available(messages: &[Message], store: &SignatureStore) -> bool {
    if store.get().is_some() {
        return true;
    }

    messages.iter().any(|message| {
        let MessageContent::Blocks(blocks) = &message.content else {
            return false;
        };

        blocks.iter().any(|block| match block {
            ContentBlock::Thinking { thinking, signature } => is_valid_signature(signature, thinking),
            _ => false,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_keeps_longest_signature() {
        let store = SignatureStore::new();
        store.store("short");
        store.store("a-much-longer-signature-value-here");
        store.store("x");

        assert_eq!(store.get().unwrap(), "a-much-longer-signature-value-here");
    }

    #[test]
    fn valid_signature_by_length_or_empty_thinking() {
        assert!(is_valid_signature(&"a".repeat(50), "some thought"));
        assert!(!is_valid_signature(&"a".repeat(49), "some thought"));
        assert!(is_valid_signature("short", ""));
        assert!(!is_valid_signature("", ""));
    }

    #[test]
    fn downgrades_invalid_thinking_without_store_value() {
        let store = SignatureStore::new();
        let blocks = vec![ContentBlock::Thinking {
            thinking: "reasoning".into(),
            signature: "short".into(),
        }];

        let filtered = filter_assistant_content(blocks, &store);
        assert_eq!(filtered.len(), 1);
        assert!(matches!(filtered[0], ContentBlock::Text { .. }));
    }

    #[test]
    fn repairs_invalid_thinking_with_store_value() {
        let store = SignatureStore::new();
        store.store(&"x".repeat(60));

        let blocks = vec![ContentBlock::Thinking {
            thinking: "reasoning".into(),
            signature: "short".into(),
        }];

        let filtered = filter_assistant_content(blocks, &store);
        assert!(matches!(&filtered[0], ContentBlock::Thinking { signature, .. } if signature.len() == 60));
    }

    #[test]
    fn empty_result_substitutes_empty_text_block() {
        let store = SignatureStore::new();
        let blocks = vec![ContentBlock::Thinking {
            thinking: "".into(),
            signature: "".into(),
        }];

        let filtered = filter_assistant_content(blocks, &store);
        assert_eq!(filtered.len(), 1);
        assert!(matches!(&filtered[0], ContentBlock::Text { text } if text.is_empty()));
    }

    #[test]
    fn tool_use_without_thinking_forces_disable() {
        let messages = vec![Message::assistant(MessageContent::Blocks(vec![ContentBlock::ToolUse {
            id: "1".into(),
            name: "f".into(),
            input: serde_json::json!({}),
            signature: None,
        }]))];

        assert!(last_assistant_requires_thinking_disabled(&messages));
    }
}
