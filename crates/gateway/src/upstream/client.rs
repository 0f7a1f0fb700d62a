//! OAuth2 refresh, the rotating base-URL pool with per-URL cool-down, 429
//! retry, and the SSE transport for `v1internal:streamGenerateContent`
//! Grounded on
//! `provider/http_client.rs::default_http_client_builder` for HTTP client
//! tuning and `provider/google.rs`'s `eventsource_stream::Eventsource` usage
//! over `response.bytes_stream()` for the SSE line iterator.

use std::{
    collections::HashMap,
    pin::Pin,
    sync::Mutex,
    time::{Duration, Instant},
};

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex as AsyncMutex;

use crate::{
    error::{GatewayError, GatewayResult},
    upstream::envelope::{LoadCodeAssistMetadata, LoadCodeAssistRequest, LoadCodeAssistResponse, TokenResponse, UpstreamEnvelope},
};

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// The fixed installed-app OAuth2 client every Antigravity editor ships with.
/// Not a per-tenant secret: it identifies the client application, the way
/// `gcloud`'s own bundled OAuth client id does.
const OAUTH_CLIENT_ID: &str = "681255809395-oo8ft2oprdrnp9e3aqf6avae1wuijarp.apps.googleusercontent.com";
const OAUTH_CLIENT_SECRET: &str = "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";

const USER_AGENT: &str = "antigravity/1.104.0 darwin/arm64";
const URL_COOLDOWN: Duration = Duration::from_secs(5 * 60);
const RATE_LIMIT_RETRY_DELAY: Duration = Duration::from_secs(5);
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// One raw SSE `data:` payload, still unparsed JSON text (or a literal
/// `[DONE]` terminator). The reusable primitive both the streaming emitters
/// and the non-streaming aggregator consume.
pub type RawLine = String;
pub type SseLineStream = Pin<Box<dyn Stream<Item = GatewayResult<RawLine>> + Send>>;

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Coordinates OAuth2, project bootstrap, endpoint failover, and the SSE
/// transport for the single upstream action this gateway speaks.
pub struct UpstreamClient {
    http: reqwest::Client,
    refresh_token: SecretString,
    base_urls: Vec<String>,
    configured_project: Option<String>,
    token: AsyncMutex<Option<CachedToken>>,
    project: AsyncMutex<Option<String>>,
    cooldowns: Mutex<HashMap<String, Instant>>,
}

impl UpstreamClient {
    pub fn new(upstream: &config::UpstreamConfig) -> anyhow::Result<Self> {
        let http = default_http_client_builder().build()?;

        let refresh_token = upstream
            .refresh_token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("upstream.refresh_token is required"))?;

        Ok(Self {
            http,
            refresh_token,
            base_urls: upstream.base_urls.clone(),
            configured_project: upstream.project_id.clone(),
            token: AsyncMutex::new(None),
            project: AsyncMutex::new(None),
            cooldowns: Mutex::new(HashMap::new()),
        })
    }

    /// Resolves the Google Cloud project id, lazily calling `loadCodeAssist`
    /// against the first base URL on first use when unconfigured.
    pub async fn resolve_project(&self) -> GatewayResult<String> {
        if let Some(project) = &self.configured_project {
            return Ok(project.clone());
        }

        let mut cached = self.project.lock().await;
        if let Some(project) = cached.as_ref() {
            return Ok(project.clone());
        }

        let token = self.access_token().await?;

        let base = self
            .base_urls
            .first()
            .cloned()
            .ok_or_else(|| GatewayError::upstream(reqwest::StatusCode::SERVICE_UNAVAILABLE, "no upstream base URLs configured"))?;

        log::debug!("bootstrapping upstream project via loadCodeAssist at {base}");

        let response = self
            .http
            .post(format!("{base}/v1internal:loadCodeAssist"))
            .bearer_auth(&token)
            .json(&LoadCodeAssistRequest {
                metadata: LoadCodeAssistMetadata {
                    ide_type: "ANTIGRAVITY".to_owned(),
                },
            })
            .send()
            .await
            .map_err(|e| GatewayError::upstream(reqwest::StatusCode::BAD_GATEWAY, &e.to_string()))?;

        let body: LoadCodeAssistResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::upstream(reqwest::StatusCode::BAD_GATEWAY, &e.to_string()))?;

        let project = body
            .cloudaicompanion_project
            .ok_or_else(|| GatewayError::upstream(reqwest::StatusCode::BAD_GATEWAY, "loadCodeAssist returned no project id"))?;

        *cached = Some(project.clone());
        Ok(project)
    }

    async fn access_token(&self) -> GatewayResult<String> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now()
        {
            return Ok(token.access_token.clone());
        }

        log::debug!("refreshing upstream OAuth2 access token");

        let params = [
            ("client_id", OAUTH_CLIENT_ID),
            ("client_secret", OAUTH_CLIENT_SECRET),
            ("refresh_token", self.refresh_token.expose_secret()),
            ("grant_type", "refresh_token"),
        ];

        let response = self.http.post(TOKEN_ENDPOINT).form(&params).send().await.map_err(|e| {
            GatewayError::upstream(reqwest::StatusCode::BAD_GATEWAY, &format!("OAuth token exchange failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::upstream(status, &format!("OAuth token exchange failed: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::upstream(reqwest::StatusCode::BAD_GATEWAY, &e.to_string()))?;

        let expires_at = Instant::now() + Duration::from_secs(token.expires_in.saturating_sub(60));
        let access_token = token.access_token.clone();

        *cached = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at,
        });

        Ok(access_token)
    }

    /// URLs whose cool-down has passed, falling back to the full pool when
    /// every URL is currently cooling down.
    fn eligible_urls(&self) -> Vec<String> {
        let now = Instant::now();
        let cooldowns = self.cooldowns.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let eligible: Vec<String> = self
            .base_urls
            .iter()
            .filter(|url| cooldowns.get(*url).is_none_or(|&until| now >= until))
            .cloned()
            .collect();

        if eligible.is_empty() { self.base_urls.clone() } else { eligible }
    }

    fn set_cooldown(&self, url: &str) {
        let mut cooldowns = self.cooldowns.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        cooldowns.insert(url.to_owned(), Instant::now() + URL_COOLDOWN);
    }

    /// Sends `envelope` to `v1internal:streamGenerateContent?alt=sse`,
    /// always in SSE mode, trying each eligible base URL in order. A
    /// transport error or HTTP 429 sets that URL's cool-down and moves to
    /// the next one; a 429 additionally sleeps 5s before the next attempt.
    pub async fn send(&self, envelope: &UpstreamEnvelope) -> GatewayResult<SseLineStream> {
        let token = self.access_token().await?;
        let urls = self.eligible_urls();

        let mut last_error = None;

        for url in &urls {
            match self.try_send(url, envelope, &token).await {
                Ok(stream) => return Ok(stream),
                Err(TrySendError::RateLimited(error)) => {
                    self.set_cooldown(url);
                    last_error = Some(error);
                    tokio::time::sleep(RATE_LIMIT_RETRY_DELAY).await;
                }
                Err(TrySendError::Other(error)) => {
                    self.set_cooldown(url);
                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| GatewayError::upstream(reqwest::StatusCode::SERVICE_UNAVAILABLE, "no upstream base URLs available")))
    }

    async fn try_send(&self, base: &str, envelope: &UpstreamEnvelope, token: &str) -> Result<SseLineStream, TrySendError> {
        let response = self
            .http
            .post(format!("{base}/v1internal:streamGenerateContent?alt=sse"))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .json(envelope)
            .send()
            .await
            .map_err(|e| TrySendError::Other(GatewayError::upstream(reqwest::StatusCode::BAD_GATEWAY, &e.to_string())))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(TrySendError::RateLimited(GatewayError::upstream(status, &body)));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrySendError::Other(GatewayError::upstream(status, &body)));
        }

        let lines = response.bytes_stream().eventsource().filter_map(|event| async move {
            match event {
                Ok(event) => Some(Ok(event.data)),
                Err(error) => {
                    log::warn!("upstream SSE transport error: {error}");
                    None
                }
            }
        });

        Ok(Box::pin(lines))
    }
}

enum TrySendError {
    RateLimited(GatewayError),
    Other(GatewayError),
}

fn default_http_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    #[test]
    fn cooldown_window_is_five_minutes() {
        assert_eq!(super::URL_COOLDOWN, Duration::from_secs(300));
    }

    #[test]
    fn eligible_urls_fall_back_to_full_pool_when_all_cooling() {
        // Pure logic check on the filtering rule without constructing a real
        // client (which needs a refresh token): every URL cooling down means
        // the filter would yield an empty vec, and the caller must fall back
        // to the full list rather than give up.
        let now = Instant::now();
        let urls = vec!["a".to_owned(), "b".to_owned()];
        let mut cooldowns = std::collections::HashMap::new();
        cooldowns.insert("a".to_owned(), now + Duration::from_secs(60));
        cooldowns.insert("b".to_owned(), now + Duration::from_secs(60));

        let eligible: Vec<&String> = urls.iter().filter(|u| cooldowns.get(*u).is_none_or(|&until| now >= until)).collect();

        assert!(eligible.is_empty());
    }
}
