mod cli;
mod commands;
mod config;
mod crawl;
mod credentials;
mod http;
mod state;
mod wiring;

use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::commands::CommandError;
use crate::config::ConfigError;
use crate::http::HttpError;
use crate::wiring::WiringError;

const CRAWL_SHUTDOWN_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("wiring error: {0}")]
    Wiring(#[from] WiringError),
    #[error("http error: {0}")]
    Http(#[from] HttpError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    config::load_dotenv()?;
    let config = config::AppConfig::from_env()?;
    let state = wiring::build_state(config).await?;

    match cli.command {
        Command::Serve => {
            let addr = state.config.http_addr;
            let http_state = state.clone();
            let api = tokio::spawn(async move {
                info!(%addr, "http server starting");
                http::serve(addr, http_state).await
            });
            tokio::select! {
                _ = shutdown_signal() => {
                    info!("shutdown signal received");
                    state.crawl.shutdown(CRAWL_SHUTDOWN_WAIT).await;
                }
                res = api => {
                    res??;
                }
            }
        }
        command => commands::run(command, &state).await?,
    }

    state.db.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to install ctrl-c handler");
    }
}
