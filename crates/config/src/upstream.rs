//! Upstream Antigravity backend configuration: OAuth refresh credentials and
//! the failover pool of `v1internal:streamGenerateContent` base URLs.

use secrecy::SecretString;
use serde::Deserialize;

fn default_base_urls() -> Vec<String> {
    vec![
        "https://sandbox-cloudcode-pa.googleapis.com".to_owned(),
        "https://daily-cloudcode-pa.googleapis.com".to_owned(),
        "https://cloudcode-pa.googleapis.com".to_owned(),
    ]
}

/// Upstream connection settings: OAuth2 refresh credentials, the lazily
/// resolved project id, and the endpoint pool used for failover.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    /// The OAuth2 refresh token exchanged for short-lived access tokens.
    ///
    /// Required; missing after CLI/env/file merge is a fatal startup error.
    pub refresh_token: Option<SecretString>,
    /// The Google Cloud project id. Resolved lazily on first token exchange
    /// when left unset.
    pub project_id: Option<String>,
    /// Ordered pool of base URLs tried in turn on failover.
    pub base_urls: Vec<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            refresh_token: None,
            project_id: None,
            base_urls: default_base_urls(),
        }
    }
}
