//! Cursor editor variant ↔ canonical. Either Anthropic-shaped
//! or OpenAI-Chat-shaped on the wire; this module only detects which one a
//! request body is and delegates to the matching sibling adapter.

use serde_json::Value;

use crate::canonical::CanonicalRequest;

/// True when a Cursor request body should be treated as Anthropic-shaped:
/// an `Anthropic-Beta` header was sent, or the first message's `content` is
/// a JSON array rather than a string.
pub fn is_anthropic_shaped(has_anthropic_beta_header: bool, body: &Value) -> bool {
    if has_anthropic_beta_header {
        return true;
    }

    body.get("messages")
        .and_then(Value::as_array)
        .and_then(|messages| messages.first())
        .and_then(|first| first.get("content"))
        .is_some_and(Value::is_array)
}

/// Parses a Cursor request body as whichever dialect [`is_anthropic_shaped`]
/// determined, sanitizing tool schemas in place for the Anthropic branch.
pub fn to_canonical(has_anthropic_beta_header: bool, body: Value) -> Result<CanonicalRequest, serde_json::Error> {
    if is_anthropic_shaped(has_anthropic_beta_header, &body) {
        let mut body = body;
        sanitize_tool_schemas(&mut body);
        let request: crate::adapters::anthropic::AnthropicRequest = serde_json::from_value(body)?;
        Ok(crate::adapters::anthropic::to_canonical(request))
    } else {
        let request: crate::adapters::openai_chat::ChatRequest = serde_json::from_value(body)?;
        Ok(crate::adapters::openai_chat::to_canonical(request))
    }
}

fn sanitize_tool_schemas(body: &mut Value) {
    let Some(tools) = body.get_mut("tools").and_then(Value::as_array_mut) else {
        return;
    };

    for tool in tools {
        if let Some(schema) = tool.get("input_schema") {
            let sanitized = crate::schema::sanitize(schema);
            tool["input_schema"] = sanitized;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn anthropic_beta_header_forces_anthropic_shape() {
        let body = json!({"messages": [{"role": "user", "content": "hi"}]});
        assert!(is_anthropic_shaped(true, &body));
    }

    #[test]
    fn list_content_on_first_message_implies_anthropic_shape() {
        let body = json!({"messages": [{"role": "user", "content": [{"type": "text", "text": "hi"}]}]});
        assert!(is_anthropic_shaped(false, &body));
    }

    #[test]
    fn string_content_without_header_is_openai_shaped() {
        let body = json!({"messages": [{"role": "user", "content": "hi"}]});
        assert!(!is_anthropic_shaped(false, &body));
    }
}
