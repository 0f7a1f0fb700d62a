//! Model identifier mapping and the fixed metadata enumeration served by the
//! listing endpoints.

/// A supported model's advertised context limits.
#[derive(Debug, Clone, Copy)]
pub struct ModelInfo {
    pub id: &'static str,
    pub input_token_limit: u32,
    pub output_token_limit: u32,
}

const INPUT_TOKEN_LIMIT: u32 = 128_000;
const OUTPUT_TOKEN_LIMIT: u32 = 8_192;

const SUPPORTED_MODEL_IDS: &[&str] = &[
    "claude-sonnet-4-5",
    "claude-opus-4-5",
    "claude-opus-4-5-thinking",
    "gemini-2.5-flash",
    "gemini-2.5-pro",
    "gemini-3-pro",
];

/// Prefix aliases tried in longest-prefix-first order when a requested
/// model isn't an exact match in [`SUPPORTED_MODEL_IDS`].
const ALIASES: &[(&str, &str)] = &[
    ("claude-3-5-sonnet", "claude-sonnet-4-5"),
    ("claude-opus-4", "claude-opus-4-5-thinking"),
    ("gpt-4", "claude-sonnet-4-5"),
    ("gpt-3.5", "gemini-2.5-flash"),
];

const FALLBACK_MODEL: &str = "claude-sonnet-4-5";

/// The fixed enumeration of supported identifiers, as served by the listing
/// endpoints.
pub fn supported_models() -> Vec<ModelInfo> {
    SUPPORTED_MODEL_IDS
        .iter()
        .map(|&id| ModelInfo {
            id,
            input_token_limit: INPUT_TOKEN_LIMIT,
            output_token_limit: OUTPUT_TOKEN_LIMIT,
        })
        .collect()
}

/// Maps a client-supplied model identifier to one of the supported set.
pub fn map_model(requested: &str) -> String {
    if SUPPORTED_MODEL_IDS.contains(&requested) {
        return requested.to_owned();
    }

    let alias = ALIASES
        .iter()
        .filter(|(prefix, _)| requested.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len());

    if let Some((_, mapped)) = alias {
        return (*mapped).to_owned();
    }

    if requested.starts_with("gemini-") || requested.starts_with("claude-") {
        return requested.to_owned();
    }

    FALLBACK_MODEL.to_owned()
}

/// Whether a (mapped) model name supports chain-of-thought thinking.
pub fn supports_thinking(model: &str) -> bool {
    let lower = model.to_lowercase();
    lower.contains("-thinking") || lower.contains("gemini-3-pro") || lower.starts_with("claude-")
}

/// Whether a (mapped) model belongs to the Gemini family, which accepts the
/// dummy signature sentinel in lieu of a real one.
pub fn is_gemini_family(model: &str) -> bool {
    model.to_lowercase().starts_with("gemini-")
}

/// Formats a model id as a Gemini `models/<id>` resource name, as served by
/// `/v1beta/models`.
pub fn to_gemini_resource_name(id: &str) -> String {
    format!("models/{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_passes_through() {
        assert_eq!(map_model("claude-sonnet-4-5"), "claude-sonnet-4-5");
    }

    #[test]
    fn longest_prefix_alias_wins() {
        assert_eq!(map_model("claude-3-5-sonnet-20241022"), "claude-sonnet-4-5");
        assert_eq!(map_model("claude-opus-4-20250101"), "claude-opus-4-5-thinking");
        assert_eq!(map_model("gpt-4o"), "claude-sonnet-4-5");
        assert_eq!(map_model("gpt-3.5-turbo"), "gemini-2.5-flash");
    }

    #[test]
    fn unrecognized_gemini_or_claude_prefix_passes_through() {
        assert_eq!(map_model("gemini-custom-preview"), "gemini-custom-preview");
        assert_eq!(map_model("claude-future-model"), "claude-future-model");
    }

    #[test]
    fn unknown_prefix_falls_back() {
        assert_eq!(map_model("davinci-002"), FALLBACK_MODEL);
    }

    #[test]
    fn thinking_support_rules() {
        assert!(supports_thinking("claude-opus-4-5-thinking"));
        assert!(supports_thinking("gemini-3-pro-preview"));
        assert!(supports_thinking("claude-sonnet-4-5"));
        assert!(!supports_thinking("gemini-2.5-flash"));
    }

    #[test]
    fn gemini_family_detection() {
        assert!(is_gemini_family("gemini-2.5-flash"));
        assert!(!is_gemini_family("claude-sonnet-4-5"));
    }
}
