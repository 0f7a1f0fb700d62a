use std::path::Path;

use crate::{Config, Error};

/// Loads configuration from `path` if it exists, then overlays the fixed set
/// of `ANTIGRAVITY_*` environment variables on top of the file (or defaults,
/// when no file is present).
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
    let path = path.as_ref();

    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);

    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(host) = std::env::var("ANTIGRAVITY_HOST") {
        config.server.host = host;
    }

    if let Ok(port) = std::env::var("ANTIGRAVITY_PORT")
        && let Ok(port) = port.parse()
    {
        config.server.port = port;
    }

    if let Ok(api_key) = std::env::var("ANTIGRAVITY_API_KEY") {
        config.api_key = Some(api_key.into());
    }

    if let Ok(refresh_token) = std::env::var("ANTIGRAVITY_REFRESH_TOKEN") {
        config.upstream.refresh_token = Some(refresh_token.into());
    }

    if let Ok(project_id) = std::env::var("ANTIGRAVITY_PROJECT_ID") {
        config.upstream.project_id = Some(project_id);
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::Config;

    #[test]
    fn file_values_parse() {
        let toml = indoc! {r#"
            api_key = "shared-secret"

            [server]
            host = "127.0.0.1"
            port = 9090

            [upstream]
            refresh_token = "rt-123"
            project_id = "my-project"
            base_urls = ["https://example.invalid"]

            [rate_limit]
            max_requests = 5
            window_secs = 30
            min_interval_secs = 1

            [thinking]
            enabled = false
            budget_tokens = 2048
        "#};

        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.upstream.project_id.as_deref(), Some("my-project"));
        assert_eq!(config.rate_limit.max_requests, 5);
        assert!(!config.thinking.enabled);
    }
}
