//! The Antigravity protocol gateway: six client-facing LLM API dialects
//! translated through a canonical (Anthropic-shaped) intermediate
//! representation and dispatched to a single upstream `v1internal` endpoint.
//! See the module docs on [`transform`], [`streaming`], and [`aggregator`]
//! for the pieces this router wires together.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response, Sse, sse::Event},
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub mod adapters;
mod aggregator;
mod auth;
mod canonical;
mod error;
mod models;
mod schema;
mod session;
mod streaming;
mod thinking;
mod transform;
mod upstream;

pub use error::{AnthropicError, GatewayError, GatewayResult, GeminiError};

use canonical::{CanonicalRequest, ThinkingRequest};
use upstream::{SseLineStream, UpstreamClient, envelope::UpstreamLine};

/// Shared state handed to every handler behind an `Arc`.
pub struct AppState {
    config: Arc<config::Config>,
    upstream: UpstreamClient,
    rate_limiter: rate_limit::RateLimiter,
}

/// Builds the full router: every dialect endpoint behind the shared-secret
/// auth gate, plus the unauthenticated health check.
pub fn router(config: Arc<config::Config>) -> anyhow::Result<Router> {
    let upstream = UpstreamClient::new(&config.upstream)?;
    let rate_limiter = rate_limit::RateLimiter::new(&config.rate_limit);

    let state = Arc::new(AppState {
        config,
        upstream,
        rate_limiter,
    });

    let router = Router::new()
        .route("/v1/messages", post(anthropic_messages))
        .route("/v1/chat/completions", post(openai_chat_completions))
        .route("/v1/responses", post(openai_chat_completions))
        .route("/v1/completions", post(legacy_completions))
        .route("/cursor/v1/chat/completions", post(cursor_chat_completions))
        .route("/cursor2/v1/responses", post(responses_api))
        .route("/v1beta/models/{model}", get(gemini_model_metadata).post(gemini_generate))
        .route("/v1/models", get(list_models))
        .route("/v1beta/models", get(list_models_gemini))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), auth::require_api_key))
        .route("/health", get(health))
        .with_state(state);

    Ok(router)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ---- dispatch pipeline --------------------------------------------------

/// Rate-limits, resolves the upstream project, transforms the canonical
/// request into the upstream envelope, and sends it. Every dialect handler
/// funnels through this.
async fn dispatch(state: &AppState, canonical: &CanonicalRequest) -> GatewayResult<SseLineStream> {
    state.rate_limiter.acquire().await;
    let project = state.upstream.resolve_project().await?;
    let envelope = transform::transform(canonical, &project);
    state.upstream.send(&envelope).await
}

/// Applies the config-level default thinking policy to a canonical request
/// produced by a dialect whose wire format carries no thinking toggle of its
/// own (OpenAI Chat, Legacy Completions, OpenAI Responses, and Cursor's
/// OpenAI-shaped branch). Anthropic, Gemini, and Cursor's Anthropic-shaped
/// branch already carry an explicit client signal and are left untouched.
fn apply_default_thinking(canonical: &mut CanonicalRequest, thinking: &config::ThinkingConfig) {
    canonical.thinking = ThinkingRequest {
        enabled: thinking.enabled,
        budget_tokens: thinking.enabled.then_some(thinking.budget_tokens),
    };
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> GatewayResult<T> {
    serde_json::from_slice(body).map_err(|e| GatewayError::InvalidRequest(e.to_string()))
}

/// Builds an SSE stream for dialects whose wire events carry their own
/// `"type"` tag (Anthropic, Responses): each event is serialized, its
/// `type` read back out for the `event:` line, and the whole object sent
/// as `data:`.
fn sse_named<S, E>(events: S) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>
where
    S: Stream<Item = GatewayResult<E>> + Send + 'static,
    E: serde::Serialize + Send + 'static,
{
    Sse::new(events.map(|result| {
        let event = match result {
            Ok(event) => event,
            Err(error) => {
                log::error!("stream error: {error}");
                return Ok(Event::default().event("error").data(r#"{"type":"error"}"#));
            }
        };

        let value = serde_json::to_value(&event).unwrap_or(Value::Null);
        let name = value.get("type").and_then(Value::as_str).unwrap_or("message").to_owned();
        let body = serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_owned());

        Ok(Event::default().event(name).data(body))
    }))
}

/// Builds an SSE stream for dialects that send bare `data:` lines and
/// terminate with a literal `data: [DONE]` (OpenAI Chat, Cursor).
fn sse_done_terminated<S, E>(events: S) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>
where
    S: Stream<Item = GatewayResult<E>> + Send + 'static,
    E: serde::Serialize + Send + 'static,
{
    let body = events.map(|result| match result {
        Ok(event) => {
            let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_owned());
            Ok(Event::default().data(json))
        }
        Err(error) => {
            log::error!("stream error: {error}");
            Ok(Event::default().data(r#"{"error":"stream error"}"#))
        }
    });

    let with_done = body.chain(futures::stream::once(async { Ok(Event::default().data("[DONE]")) }));

    Sse::new(with_done)
}

/// Drains `lines` lazily, re-emitting each upstream body as a Gemini
/// `streamGenerateContent` chunk stamped with `model_version`. Stateless
/// pass-through: no [`streaming::LineProcessor`] is involved, and the
/// upstream's own `[DONE]` terminator simply ends the stream rather than
/// being re-emitted, per the Gemini wire contract.
fn gemini_stream_events(lines: SseLineStream, model_version: String) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    futures::stream::unfold((lines, model_version), |(mut lines, model_version)| async move {
        loop {
            match lines.next().await {
                Some(Ok(raw)) if raw == "[DONE]" => return None,
                Some(Ok(raw)) => match serde_json::from_str::<UpstreamLine>(&raw) {
                    Ok(decoded) => {
                        let chunk = streaming::gemini::to_gemini_chunk(decoded.into_body(), &model_version);
                        let json = serde_json::to_string(&chunk).unwrap_or_else(|_| "{}".to_owned());
                        return Some((Ok(Event::default().data(json)), (lines, model_version)));
                    }
                    Err(error) => {
                        log::warn!("dropping malformed upstream line: {error}");
                        continue;
                    }
                },
                Some(Err(error)) => {
                    log::error!("upstream stream error: {error}");
                    return None;
                }
                None => return None,
            }
        }
    })
}

// ---- Anthropic Messages --------------------------------------------------

async fn anthropic_messages(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, AnthropicError> {
    let request: adapters::anthropic::AnthropicRequest = parse_json(&body).map_err(AnthropicError::from)?;
    let stream = request.stream.unwrap_or(false);
    let canonical = adapters::anthropic::to_canonical(request);
    let model = models::map_model(&canonical.model);
    let store = thinking::global_store();

    let lines = dispatch(&state, &canonical).await.map_err(AnthropicError::from)?;

    if stream {
        let processor = streaming::anthropic::AnthropicStreamProcessor::new(model, store);
        Ok(sse_named(streaming::drive(lines, processor)).into_response())
    } else {
        let response = aggregator::aggregate(lines, model, store).await.map_err(AnthropicError::from)?;
        Ok(Json(adapters::anthropic::from_canonical(response)).into_response())
    }
}

// ---- OpenAI Chat Completions (also serves /v1/responses, aliased) ------

async fn openai_chat_completions(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, GatewayError> {
    let request: adapters::openai_chat::ChatRequest = parse_json(&body)?;
    let stream = request.stream.unwrap_or(false);
    let mut canonical = adapters::openai_chat::to_canonical(request);
    apply_default_thinking(&mut canonical, &state.config.thinking);
    let model = models::map_model(&canonical.model);
    let store = thinking::global_store();

    let lines = dispatch(&state, &canonical).await?;

    if stream {
        let processor = streaming::openai_chat::OpenAiChatStreamProcessor::new(model, store);
        Ok(sse_done_terminated(streaming::drive(lines, processor)).into_response())
    } else {
        let response = aggregator::aggregate(lines, model, store).await?;
        Ok(Json(adapters::openai_chat::from_canonical(response)).into_response())
    }
}

// ---- OpenAI Legacy Completions -------------------------------------------

async fn legacy_completions(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, GatewayError> {
    let request: adapters::legacy_completions::CompletionsRequest = parse_json(&body)?;
    let mut canonical = adapters::legacy_completions::to_canonical(request);
    apply_default_thinking(&mut canonical, &state.config.thinking);
    let model = models::map_model(&canonical.model);
    let store = thinking::global_store();

    // No streaming wire shape is defined for this dialect; always aggregate.
    let lines = dispatch(&state, &canonical).await?;
    let response = aggregator::aggregate(lines, model, store).await?;
    Ok(Json(adapters::legacy_completions::from_canonical(response)).into_response())
}

// ---- OpenAI Responses API (/cursor2/v1/responses) ------------------------

async fn responses_api(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, GatewayError> {
    let request: adapters::openai_responses::ResponsesRequest = parse_json(&body)?;
    let stream = request.stream.unwrap_or(false);
    let mut canonical = adapters::openai_responses::to_canonical(request);
    apply_default_thinking(&mut canonical, &state.config.thinking);
    let model = models::map_model(&canonical.model);
    let store = thinking::global_store();

    let lines = dispatch(&state, &canonical).await?;

    if stream {
        let processor = streaming::responses::ResponsesStreamProcessor::new(model, store);
        Ok(sse_named(streaming::drive(lines, processor)).into_response())
    } else {
        let response = aggregator::aggregate(lines, model, store).await?;
        Ok(Json(adapters::openai_responses::from_canonical(response)).into_response())
    }
}

// ---- Cursor editor variant ------------------------------------------------

async fn cursor_chat_completions(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Result<Response, GatewayError> {
    let has_anthropic_beta_header = headers.contains_key("anthropic-beta");

    let value: Value = serde_json::from_slice(&body).map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
    let is_anthropic_shaped = adapters::cursor::is_anthropic_shaped(has_anthropic_beta_header, &value);
    let stream = value.get("stream").and_then(Value::as_bool).unwrap_or(false);

    let mut canonical =
        adapters::cursor::to_canonical(has_anthropic_beta_header, value).map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

    if !is_anthropic_shaped {
        apply_default_thinking(&mut canonical, &state.config.thinking);
    }

    let model = models::map_model(&canonical.model);
    let store = thinking::global_store();

    let lines = dispatch(&state, &canonical).await?;

    if stream {
        let processor = streaming::cursor::CursorStreamProcessor::new(model, store);
        Ok(sse_done_terminated(streaming::drive(lines, processor)).into_response())
    } else {
        let response = aggregator::aggregate(lines, model, store).await?;
        Ok(Json(adapters::openai_chat::from_canonical(response)).into_response())
    }
}

// ---- Gemini v1beta ---------------------------------------------------------

async fn gemini_generate(State(state): State<Arc<AppState>>, Path(model_and_action): Path<String>, body: Bytes) -> Result<Response, GeminiError> {
    let (requested_model, action) = model_and_action
        .rsplit_once(':')
        .ok_or_else(|| GeminiError::from(GatewayError::InvalidRequest("missing :action suffix".to_owned())))?;

    let request: adapters::gemini::GeminiRequest = parse_json(&body).map_err(GeminiError::from)?;
    let mut canonical = adapters::gemini::to_canonical(request);
    canonical.model = requested_model.to_owned();
    let model = models::map_model(&canonical.model);
    let store = thinking::global_store();

    let lines = dispatch(&state, &canonical).await.map_err(GeminiError::from)?;

    match action {
        "streamGenerateContent" => Ok(Sse::new(gemini_stream_events(lines, model)).into_response()),
        _ => {
            let response = aggregator::aggregate(lines, model, store).await.map_err(GeminiError::from)?;
            Ok(Json(adapters::gemini::from_canonical(response)).into_response())
        }
    }
}

async fn gemini_model_metadata(Path(model_and_action): Path<String>) -> Result<Response, GeminiError> {
    let model_id = model_and_action.split(':').next().unwrap_or(&model_and_action);

    let Some(info) = models::supported_models().into_iter().find(|m| m.id == model_id) else {
        return Err(GeminiError::from(GatewayError::InvalidRequest(format!("unknown model: {model_id}"))));
    };

    Ok(Json(serde_json::json!({
        "name": models::to_gemini_resource_name(info.id),
        "inputTokenLimit": info.input_token_limit,
        "outputTokenLimit": info.output_token_limit,
    }))
    .into_response())
}

// ---- model listing ----------------------------------------------------------

async fn list_models() -> impl IntoResponse {
    let data: Vec<_> = models::supported_models()
        .into_iter()
        .map(|m| serde_json::json!({ "id": m.id, "object": "model" }))
        .collect();

    Json(serde_json::json!({ "object": "list", "data": data }))
}

async fn list_models_gemini() -> impl IntoResponse {
    let models: Vec<_> = models::supported_models()
        .into_iter()
        .map(|m| {
            serde_json::json!({
                "name": models::to_gemini_resource_name(m.id),
                "inputTokenLimit": m.input_token_limit,
                "outputTokenLimit": m.output_token_limit,
            })
        })
        .collect();

    Json(serde_json::json!({ "models": models }))
}
