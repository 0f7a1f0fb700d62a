//! Lenient numeric deserialization shared by the OpenAI-family adapters.
//! Each dialect ties its token-limit field to the same rule: default to
//! [`CanonicalRequest::DEFAULT_MAX_TOKENS`](crate::canonical::CanonicalRequest::DEFAULT_MAX_TOKENS)
//! if the value is missing or non-numeric, rather than rejecting the
//! request. `serde_json::Value::as_u64` already returns `None` for
//! strings, `null`, fractional floats, and negative numbers, so decoding
//! through `Value` and falling through to `None` covers all of them.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub fn max_tokens<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_u64().and_then(|tokens| u32::try_from(tokens).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    struct Wrapper {
        #[serde(default, deserialize_with = "max_tokens")]
        max_tokens: Option<u32>,
    }

    fn parse(json: &str) -> Option<u32> {
        serde_json::from_str::<Wrapper>(json).unwrap().max_tokens
    }

    #[test]
    fn accepts_a_plain_integer() {
        assert_eq!(parse(r#"{"max_tokens": 256}"#), Some(256));
    }

    #[test]
    fn missing_field_defaults_to_none() {
        assert_eq!(parse("{}"), None);
    }

    #[test]
    fn null_defaults_to_none() {
        assert_eq!(parse(r#"{"max_tokens": null}"#), None);
    }

    #[test]
    fn string_defaults_to_none() {
        assert_eq!(parse(r#"{"max_tokens": "100"}"#), None);
    }

    #[test]
    fn fractional_float_defaults_to_none() {
        assert_eq!(parse(r#"{"max_tokens": 4096.5}"#), None);
    }

    #[test]
    fn negative_integer_defaults_to_none() {
        assert_eq!(parse(r#"{"max_tokens": -1}"#), None);
    }
}
