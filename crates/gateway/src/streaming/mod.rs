//! Streaming reshape (C5): five dialect-specific state machines that turn
//! upstream `v1internal` SSE lines into each client dialect's own SSE byte
//! stream as bytes arrive. `anthropic` is the canonical machine; the two
//! OpenAI-family emitters (`openai_chat`, `cursor`) and `responses` consume
//! upstream parts directly or wrap the canonical machine; `gemini` is a
//! stateless pass-through.
//!
//! [`drive`] is the one reusable primitive every dialect handler calls: fed
//! the raw upstream line stream and a fresh processor, it decodes each line,
//! feeds it through the processor, and lazily yields the events the
//! processor produces, draining whatever it still owes once upstream closes.
//! This is the streaming half of the "always stream upstream" design note
//! (§4.6/§9): the non-streaming aggregator in [`crate::aggregator`] also
//! drains the same processor, replaying its canonical event sequence rather
//! than re-deriving block boundaries.

pub mod anthropic;
pub mod cursor;
pub mod gemini;
pub mod openai_chat;
pub mod responses;

use std::collections::VecDeque;

use futures::{Stream, StreamExt};

use crate::{
    error::GatewayResult,
    upstream::{client::SseLineStream, envelope::UpstreamLine},
};

/// A dialect's incremental SSE state machine. The caller feeds it one
/// decoded upstream line's body at a time via [`process`](LineProcessor::process);
/// [`finish`](LineProcessor::finish) drains whatever is still buffered once
/// the upstream connection closes.
pub trait LineProcessor {
    type Event;

    fn process(&mut self, body: crate::upstream::envelope::UpstreamResponseBody) -> Vec<Self::Event>;
    fn finish(self) -> Vec<Self::Event>;
}

impl<'a> LineProcessor for anthropic::AnthropicStreamProcessor<'a> {
    type Event = anthropic::AnthropicStreamEvent;

    fn process(&mut self, body: crate::upstream::envelope::UpstreamResponseBody) -> Vec<Self::Event> {
        anthropic::AnthropicStreamProcessor::process(self, body)
    }

    fn finish(self) -> Vec<Self::Event> {
        anthropic::AnthropicStreamProcessor::finish(self)
    }
}

impl<'a> LineProcessor for openai_chat::OpenAiChatStreamProcessor<'a> {
    type Event = openai_chat::ChatChunk;

    fn process(&mut self, body: crate::upstream::envelope::UpstreamResponseBody) -> Vec<Self::Event> {
        openai_chat::OpenAiChatStreamProcessor::process(self, body)
    }

    fn finish(self) -> Vec<Self::Event> {
        openai_chat::OpenAiChatStreamProcessor::finish(self)
    }
}

impl<'a> LineProcessor for responses::ResponsesStreamProcessor<'a> {
    type Event = responses::ResponsesStreamEvent;

    fn process(&mut self, body: crate::upstream::envelope::UpstreamResponseBody) -> Vec<Self::Event> {
        responses::ResponsesStreamProcessor::process(self, body)
    }

    fn finish(self) -> Vec<Self::Event> {
        responses::ResponsesStreamProcessor::finish(self)
    }
}

impl<'a> LineProcessor for cursor::CursorStreamProcessor<'a> {
    type Event = openai_chat::ChatChunk;

    fn process(&mut self, body: crate::upstream::envelope::UpstreamResponseBody) -> Vec<Self::Event> {
        cursor::CursorStreamProcessor::process(self, body)
    }

    fn finish(self) -> Vec<Self::Event> {
        cursor::CursorStreamProcessor::finish(self)
    }
}

enum DriveState<P: LineProcessor> {
    Running(SseLineStream, P, VecDeque<P::Event>),
    Draining(VecDeque<P::Event>),
    Done,
}

/// Drains `lines` lazily through `processor`, yielding one dialect event per
/// upstream line (or more, if a single line produces several). Malformed
/// upstream JSON is dropped with a warning, per spec §7 — the stream
/// continues rather than failing the request.
pub fn drive<P>(lines: SseLineStream, processor: P) -> impl Stream<Item = GatewayResult<P::Event>>
where
    P: LineProcessor + Send + 'static,
    P::Event: Send + 'static,
{
    let state = DriveState::Running(lines, processor, VecDeque::new());

    futures::stream::unfold(state, |mut state| async move {
        loop {
            match state {
                DriveState::Running(mut lines, mut processor, mut pending) => {
                    if let Some(event) = pending.pop_front() {
                        return Some((Ok(event), DriveState::Running(lines, processor, pending)));
                    }

                    match lines.next().await {
                        Some(Ok(raw)) if raw == "[DONE]" => {
                            state = DriveState::Draining(processor.finish().into());
                        }
                        Some(Ok(raw)) => match serde_json::from_str::<UpstreamLine>(&raw) {
                            Ok(decoded) => {
                                let mut events: VecDeque<_> = processor.process(decoded.into_body()).into();
                                if let Some(event) = events.pop_front() {
                                    return Some((Ok(event), DriveState::Running(lines, processor, events)));
                                }
                                state = DriveState::Running(lines, processor, events);
                            }
                            Err(error) => {
                                log::warn!("dropping malformed upstream line: {error}");
                                state = DriveState::Running(lines, processor, pending);
                            }
                        },
                        Some(Err(error)) => return Some((Err(error), DriveState::Done)),
                        None => {
                            state = DriveState::Draining(processor.finish().into());
                        }
                    }
                }
                DriveState::Draining(mut pending) => {
                    return match pending.pop_front() {
                        Some(event) => Some((Ok(event), DriveState::Draining(pending))),
                        None => None,
                    };
                }
                DriveState::Done => return None,
            }
        }
    })
}
