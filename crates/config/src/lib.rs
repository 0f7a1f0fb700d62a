//! Configuration structures for the Antigravity protocol gateway.

#![deny(missing_docs)]

mod error;
mod loader;
mod rate_limit;
mod server;
mod thinking;
mod upstream;

use std::path::Path;

pub use error::Error;
pub use rate_limit::RateLimitConfig;
use secrecy::SecretString;
use serde::Deserialize;
pub use server::ServerConfig;
pub use thinking::ThinkingConfig;
pub use upstream::UpstreamConfig;

fn default_debug() -> bool {
    true
}

/// Root configuration for the gateway process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server bind settings.
    pub server: ServerConfig,
    /// Upstream Antigravity backend connection settings.
    pub upstream: UpstreamConfig,
    /// Sliding-window rate limiter thresholds.
    pub rate_limit: RateLimitConfig,
    /// Default thinking-block policy.
    pub thinking: ThinkingConfig,
    /// Shared secret clients must present to authenticate against this
    /// gateway. `None` disables the auth gate.
    pub api_key: Option<SecretString>,
    /// Enables debug-level logging.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            rate_limit: RateLimitConfig::default(),
            thinking: ThinkingConfig::default(),
            api_key: None,
            debug: default_debug(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, overlaid with `ANTIGRAVITY_*`
    /// environment variables. Falls back to defaults if `path` does not
    /// exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
        loader::load(path)
    }

    /// Validates that the configuration can actually start the gateway.
    ///
    /// The only hard requirement is an upstream refresh token: everything
    /// else (project id, api key, rate limits) has a usable default.
    pub fn validate(&self) -> Result<(), Error> {
        if self.upstream.refresh_token.is_none() {
            return Err(Error::Missing("upstream.refresh_token"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use crate::Config;

    #[test]
    fn defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_debug_snapshot!(&config, @r#"
        Config {
            server: ServerConfig {
                host: "0.0.0.0",
                port: 8080,
            },
            upstream: UpstreamConfig {
                refresh_token: None,
                project_id: None,
                base_urls: [
                    "https://sandbox-cloudcode-pa.googleapis.com",
                    "https://daily-cloudcode-pa.googleapis.com",
                    "https://cloudcode-pa.googleapis.com",
                ],
            },
            rate_limit: RateLimitConfig {
                max_requests: 10,
                window_secs: 60,
                min_interval_secs: 2,
            },
            thinking: ThinkingConfig {
                enabled: true,
                budget_tokens: 10000,
            },
            api_key: None,
            debug: true,
        }
        "#);
    }

    #[test]
    fn missing_refresh_token_fails_validation() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }
}
