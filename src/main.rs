use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wallet_relay::cli::Cli;
use wallet_relay::config::Settings;
use wallet_relay::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    settings.merge_env(|key| std::env::var(key).ok());
    cli.apply(&mut settings);
    let cfg = settings.resolve()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!(
        upstream = %cfg.upstream.base_url,
        user_id = %cfg.upstream.user_id,
        app_key = cfg.upstream.app_key.is_some(),
        "Configuration loaded"
    );

    let app = Arc::new(AppState::from_config(&cfg)?);

    tokio::select! {
        res = server::listener::run(&cfg.listen_addr, app) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
