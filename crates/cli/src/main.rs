use std::sync::Arc;

use args::Args;
use clap::Parser;

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = config::Config::load(&args.config)?;

    if let Some(refresh_token) = args.refresh_token {
        config.upstream.refresh_token = Some(refresh_token.into());
    }

    if let Some(port) = args.port {
        config.server.port = port;
    }

    if let Some(api_key) = args.api_key {
        config.api_key = Some(api_key.into());
    }

    if args.debug {
        config.debug = true;
    }

    logger::init(config.debug);

    if let Err(error) = config.validate() {
        log::error!("configuration error: {error}");
        anyhow::bail!(error);
    }

    let config = Arc::new(config);
    let host = config.server.host.clone();
    let port = config.server.port;

    let router = gateway::router(config)?;

    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    log::info!(host = host.as_str(), port = port; "antigravity gateway listening");

    axum::serve(listener, router).await?;

    Ok(())
}
