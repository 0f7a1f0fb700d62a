//! The upstream client: OAuth2 token refresh, the rotating
//! base-URL pool with per-URL cool-down, 429 retry, and the reusable SSE
//! line iterator both the streaming and non-streaming paths consume.

pub mod client;
pub mod envelope;

pub use client::{RawLine, SseLineStream, UpstreamClient};
