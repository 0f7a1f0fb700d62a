//! Turns a canonical request into the upstream `v1internal` envelope: model
//! mapping, thinking-mode negotiation, the identity patch, contents
//! translation, and session id assignment.

use uuid::Uuid;

use crate::{
    canonical::{CanonicalRequest, ContentBlock, Message, MessageContent, Role},
    models,
    session::derive_session_id,
    thinking::{self, SignatureStore},
    upstream::envelope::{
        FunctionCall, FunctionCallingConfig, FunctionResponse, FunctionResponseBody, GenerationConfig,
        SystemInstruction, TextPart, ThinkingConfigWire, ToolConfig, UpstreamContent, UpstreamEnvelope, UpstreamPart,
        UpstreamRequestBody,
    },
};

const USER_AGENT: &str = "antigravity/1.104.0 darwin/arm64";
const GEMINI_FLASH_THINKING_BUDGET_CAP: u32 = 24_576;
const MAX_OUTPUT_TOKENS: u32 = 64_000;

/// A fixed, upstream-mandated system-prompt fragment. The upstream rejects
/// any request whose system instruction does not carry it verbatim.
const IDENTITY_PREAMBLE: &str = "You are Antigravity, an AI coding agent built to work inside the Antigravity \
editor. You operate with direct access to the user's workspace: read and write files, run commands, and reason \
about the project as a whole rather than a single prompt in isolation.\n\n\
Always ground your answers in the actual state of the files you can see. When you are not certain a tool call \
will succeed, say so rather than inventing output. When asked to make changes, prefer the smallest change that \
correctly satisfies the request.";

const IDENTITY_MARKER: &str = "You are Antigravity";

/// Builds the upstream envelope for `canonical`, reading and updating the
/// process-wide thinking signature store as it goes.
pub fn transform(canonical: &CanonicalRequest, project: &str) -> UpstreamEnvelope {
    transform_with_store(canonical, project, thinking::global_store())
}

fn transform_with_store(canonical: &CanonicalRequest, project: &str, store: &SignatureStore) -> UpstreamEnvelope {
    let mapped_model = models::map_model(&canonical.model);
    let is_gemini = models::is_gemini_family(&mapped_model);

    let mut thinking_enabled = canonical.thinking.enabled
        && models::supports_thinking(&mapped_model)
        && !thinking::last_assistant_requires_thinking_disabled(&canonical.messages)
        && (canonical.tools.is_empty() || thinking::signature_available(&canonical.messages, store));

    let filtered_messages = filter_messages(&canonical.messages, store);

    let mut stripped_any = false;
    let mut contents = filtered_messages
        .iter()
        .map(|message| UpstreamContent {
            role: role_name(message.role).to_owned(),
            parts: build_parts(message, thinking_enabled, is_gemini, store, &mut stripped_any),
        })
        .collect::<Vec<_>>();

    if stripped_any {
        thinking_enabled = false;
    }

    if thinking_enabled && is_gemini {
        insert_dummy_thoughts(&mut contents);
    }

    UpstreamEnvelope {
        project: project.to_owned(),
        request_id: format!("agent-{}", Uuid::new_v4()),
        user_agent: USER_AGENT.to_owned(),
        request_type: "agent".to_owned(),
        model: mapped_model.clone(),
        request: UpstreamRequestBody {
            contents,
            tool_config: ToolConfig {
                function_calling_config: FunctionCallingConfig {
                    mode: "VALIDATED".to_owned(),
                },
            },
            session_id: derive_session_id(&canonical.messages),
            system_instruction: Some(build_system_instruction(canonical.system.as_deref())),
            generation_config: Some(build_generation_config(canonical, thinking_enabled, &mapped_model)),
            tools: build_tools(canonical),
        },
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

/// Runs the thinking-block policy filter (validate/repair/downgrade/drop)
/// over every assistant message. User messages pass through unchanged.
fn filter_messages(messages: &[Message], store: &SignatureStore) -> Vec<Message> {
    messages
        .iter()
        .cloned()
        .map(|message| match (message.role, message.content) {
            (Role::Assistant, MessageContent::Blocks(blocks)) => Message::assistant(MessageContent::Blocks(
                thinking::filter_assistant_content(blocks, store),
            )),
            (role, content) => Message { role, content },
        })
        .collect()
}

enum Resolution {
    Signature(String),
    Downgrade,
}

fn resolve_signature(own: Option<&str>, store: &SignatureStore, is_gemini: bool) -> Resolution {
    if let Some(own) = own.filter(|s| !s.is_empty()) {
        return Resolution::Signature(own.to_owned());
    }

    if let Some(stored) = store.get() {
        return Resolution::Signature(stored);
    }

    if is_gemini {
        return Resolution::Signature(thinking::DUMMY_SIGNATURE.to_owned());
    }

    Resolution::Downgrade
}

fn build_parts(
    message: &Message,
    thinking_enabled: bool,
    is_gemini: bool,
    store: &SignatureStore,
    stripped_any: &mut bool,
) -> Vec<UpstreamPart> {
    let blocks = match &message.content {
        MessageContent::Text(text) => vec![ContentBlock::text(text.clone())],
        MessageContent::Blocks(blocks) => blocks.clone(),
    };

    blocks
        .into_iter()
        .enumerate()
        .map(|(index, block)| block_to_part(block, index, thinking_enabled, is_gemini, store, stripped_any))
        .collect()
}

fn block_to_part(
    block: ContentBlock,
    index: usize,
    thinking_enabled: bool,
    is_gemini: bool,
    store: &SignatureStore,
    stripped_any: &mut bool,
) -> UpstreamPart {
    match block {
        ContentBlock::Text { text } => UpstreamPart::text(text),

        // A thinking part must be first; thinking disabled for the request
        // also forces a downgrade.
        ContentBlock::Thinking { thinking, signature: _ } if !thinking_enabled || index != 0 => {
            UpstreamPart::text(thinking)
        }

        ContentBlock::Thinking { thinking, signature } => {
            match resolve_signature(Some(&signature), store, is_gemini) {
                Resolution::Signature(sig) => {
                    let text = if thinking.is_empty() { "...".to_owned() } else { thinking };
                    UpstreamPart {
                        text: Some(text),
                        thought: Some(true),
                        thought_signature: Some(sig),
                        ..UpstreamPart::default()
                    }
                }
                Resolution::Downgrade => {
                    *stripped_any = true;
                    UpstreamPart::text(thinking)
                }
            }
        }

        ContentBlock::ToolUse {
            id,
            name,
            input,
            signature,
        } => {
            let thought_signature = match resolve_signature(signature.as_deref(), store, is_gemini) {
                Resolution::Signature(sig) => Some(sig),
                Resolution::Downgrade => None,
            };

            UpstreamPart {
                function_call: Some(FunctionCall { name, args: input, id }),
                thought_signature,
                ..UpstreamPart::default()
            }
        }

        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let result = tool_result_text(&content, is_error);

            UpstreamPart {
                function_response: Some(FunctionResponse {
                    name: tool_use_id.clone(),
                    response: FunctionResponseBody { result },
                    id: tool_use_id,
                }),
                ..UpstreamPart::default()
            }
        }

        ContentBlock::Image { media_type, data } => UpstreamPart {
            inline_data: Some(crate::upstream::envelope::InlineData {
                mime_type: media_type,
                data,
            }),
            ..UpstreamPart::default()
        },
    }
}

fn tool_result_text(content: &MessageContent, is_error: bool) -> String {
    let text = match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    };

    if text.is_empty() {
        if is_error {
            "Tool execution failed.".to_owned()
        } else {
            "Success.".to_owned()
        }
    } else {
        text
    }
}

fn insert_dummy_thoughts(contents: &mut [UpstreamContent]) {
    for content in contents.iter_mut() {
        if content.role != "model" {
            continue;
        }

        let leads_with_thought = content.parts.first().is_some_and(|part| part.thought == Some(true));

        if !content.parts.is_empty() && !leads_with_thought {
            content.parts.insert(
                0,
                UpstreamPart {
                    text: Some("Thinking…".to_owned()),
                    thought: Some(true),
                    thought_signature: Some(thinking::DUMMY_SIGNATURE.to_owned()),
                    ..UpstreamPart::default()
                },
            );
        }
    }
}

fn build_system_instruction(system: Option<&str>) -> SystemInstruction {
    match system {
        Some(text) if text.contains(IDENTITY_MARKER) => SystemInstruction {
            parts: vec![TextPart { text: text.to_owned() }],
        },
        Some(text) => SystemInstruction {
            parts: vec![
                TextPart {
                    text: IDENTITY_PREAMBLE.to_owned(),
                },
                TextPart { text: text.to_owned() },
            ],
        },
        None => SystemInstruction {
            parts: vec![TextPart {
                text: IDENTITY_PREAMBLE.to_owned(),
            }],
        },
    }
}

fn build_generation_config(canonical: &CanonicalRequest, thinking_enabled: bool, mapped_model: &str) -> GenerationConfig {
    let thinking_config = thinking_enabled.then(|| {
        let budget = canonical.thinking.budget_tokens.unwrap_or(0);

        let thinking_budget = (budget > 0).then(|| {
            if mapped_model.contains("gemini-2.5-flash") {
                budget.min(GEMINI_FLASH_THINKING_BUDGET_CAP)
            } else {
                budget
            }
        });

        ThinkingConfigWire {
            include_thoughts: true,
            thinking_budget,
        }
    });

    GenerationConfig {
        max_output_tokens: MAX_OUTPUT_TOKENS,
        stop_sequences: vec![
            "<|user|>".to_owned(),
            "<|endoftext|>".to_owned(),
            "<|end_of_turn|>".to_owned(),
            "[DONE]".to_owned(),
            "\n\nHuman:".to_owned(),
        ],
        thinking_config,
        temperature: canonical.temperature,
        top_p: canonical.top_p,
    }
}

fn build_tools(canonical: &CanonicalRequest) -> Option<Vec<serde_json::Value>> {
    if canonical.tools.is_empty() {
        return None;
    }

    if canonical.tools.iter().any(|tool| tool.name == "web_search") {
        return Some(vec![serde_json::json!({
            "googleSearch": { "enhancedContent": { "imageSearch": { "maxResultCount": 5 } } }
        })]);
    }

    let declarations = canonical
        .tools
        .iter()
        .map(|tool| {
            serde_json::json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": crate::schema::sanitize(&tool.input_schema),
            })
        })
        .collect::<Vec<_>>();

    Some(vec![serde_json::json!({ "functionDeclarations": declarations })])
}

#[cfg(test)]
mod tests {
    use crate::canonical::{ContentBlock, Tool};

    use super::*;

    fn base_request() -> CanonicalRequest {
        CanonicalRequest {
            model: "gpt-4o".to_owned(),
            messages: vec![Message::user(MessageContent::Text("hi".to_owned()))],
            system: None,
            max_tokens: CanonicalRequest::DEFAULT_MAX_TOKENS,
            temperature: None,
            top_p: None,
            stream: false,
            thinking: Default::default(),
            tools: Vec::new(),
        }
    }

    #[test]
    fn identity_preamble_is_always_present() {
        let envelope = transform(&base_request(), "proj");
        let joined = envelope
            .request
            .system_instruction
            .unwrap()
            .parts
            .iter()
            .map(|p| p.text.clone())
            .collect::<Vec<_>>()
            .join("\n");
        assert!(joined.contains(IDENTITY_MARKER));
    }

    #[test]
    fn identity_preamble_not_duplicated_when_already_present() {
        let mut request = base_request();
        request.system = Some("You are Antigravity already.".to_owned());
        let envelope = transform(&request, "proj");
        assert_eq!(envelope.request.system_instruction.unwrap().parts.len(), 1);
    }

    #[test]
    fn model_maps_and_maps_role() {
        let envelope = transform(&base_request(), "proj");
        assert_eq!(envelope.model, "claude-sonnet-4-5");
        assert_eq!(envelope.request.contents[0].role, "user");
    }

    #[test]
    fn tool_use_without_thinking_disables_thinking_config() {
        let store = SignatureStore::new();

        let mut request = base_request();
        request.thinking.enabled = true;
        request.messages.push(Message::assistant(MessageContent::Blocks(vec![ContentBlock::ToolUse {
            id: "1".into(),
            name: "f".into(),
            input: serde_json::json!({}),
            signature: None,
        }])));

        let envelope = transform_with_store(&request, "proj", &store);
        assert!(envelope.request.generation_config.unwrap().thinking_config.is_none());
    }

    #[test]
    fn gemini_thinking_budget_is_clamped() {
        let mut request = base_request();
        request.model = "gemini-2.5-flash".to_owned();
        request.thinking.enabled = true;
        request.thinking.budget_tokens = Some(30_000);

        let envelope = transform(&request, "proj");
        let thinking_config = envelope.request.generation_config.unwrap().thinking_config.unwrap();
        assert_eq!(thinking_config.thinking_budget, Some(24_576));
    }

    #[test]
    fn web_search_tool_flattens_to_google_search() {
        let mut request = base_request();
        request.tools.push(Tool {
            name: "web_search".to_owned(),
            description: None,
            input_schema: serde_json::json!({}),
        });

        let envelope = transform(&request, "proj");
        let tools = envelope.request.tools.unwrap();
        assert!(tools[0].get("googleSearch").is_some());
    }
}
