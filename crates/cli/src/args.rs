use clap::Parser;

/// Command-line overrides for the gateway's TOML/environment configuration.
///
/// Any value supplied here wins over both the config file and the
/// `ANTIGRAVITY_*` environment variables.
#[derive(Debug, Parser)]
#[command(name = "antigravity-gateway", version, about = "Protocol-translating reverse proxy for Antigravity")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "antigravity.toml")]
    pub config: String,

    /// Overrides `upstream.refresh_token`.
    #[arg(long)]
    pub refresh_token: Option<String>,

    /// Overrides `server.port`.
    #[arg(long)]
    pub port: Option<u16>,

    /// Overrides `api_key`.
    #[arg(long)]
    pub api_key: Option<String>,

    /// Overrides `debug`, forcing debug-level logging regardless of config.
    #[arg(long)]
    pub debug: bool,
}
