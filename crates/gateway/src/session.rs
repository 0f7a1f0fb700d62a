//! Deterministic session-id derivation for the upstream envelope.

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::canonical::{Message, Role};

/// Clears the sign bit so the value fits a signed 63-bit integer.
const SIGN_MASK: u64 = 0x7FFF_FFFF_FFFF_FFFF;

/// Derives the upstream session id from the first user message's text:
/// SHA-256 of that text, the first 8 bytes read as a big-endian unsigned
/// 63-bit integer, formatted as `-<n>`. Falls back to a random 63-bit
/// integer when no user text exists.
pub fn derive_session_id(messages: &[Message]) -> String {
    let first_user_text = messages
        .iter()
        .find(|message| message.role == Role::User)
        .map(|message| message.content.as_text())
        .filter(|text| !text.is_empty());

    let n = match first_user_text {
        Some(text) => {
            let digest = Sha256::digest(text.as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&digest[..8]);
            u64::from_be_bytes(bytes) & SIGN_MASK
        }
        None => rand::rng().random::<u64>() & SIGN_MASK,
    };

    format!("-{n}")
}

#[cfg(test)]
mod tests {
    use crate::canonical::MessageContent;

    use super::*;

    #[test]
    fn is_deterministic_for_same_text() {
        let messages = vec![Message::user(MessageContent::Text("hello world".into()))];

        assert_eq!(derive_session_id(&messages), derive_session_id(&messages));
    }

    #[test]
    fn differs_for_different_text() {
        let a = vec![Message::user(MessageContent::Text("hello".into()))];
        let b = vec![Message::user(MessageContent::Text("goodbye".into()))];

        assert_ne!(derive_session_id(&a), derive_session_id(&b));
    }

    #[test]
    fn starts_with_dash() {
        let messages = vec![Message::user(MessageContent::Text("hi".into()))];
        assert!(derive_session_id(&messages).starts_with('-'));
    }

    #[test]
    fn falls_back_to_random_without_user_text() {
        let messages = vec![Message::assistant(MessageContent::Text("only assistant".into()))];
        let id = derive_session_id(&messages);
        assert!(id.starts_with('-'));
    }
}
