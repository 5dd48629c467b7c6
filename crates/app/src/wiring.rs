use std::sync::Arc;

use reqwest::Client;
use thiserror::Error;
use tracing::info;

use crate::config::AppConfig;
use crate::crawl::{CrawlEngine, CrawlSupervisor, Pacing};
use crate::credentials::CredentialManager;
use crate::state::AppState;
use harvest_infra::bilibili::BilibiliClient;
use harvest_infra::db::{connect, run_migrations, DbPoolError};

const MAX_DB_CONNECTIONS: u32 = 5;

#[derive(Debug, Error)]
pub enum WiringError {
    #[error("db error: {0}")]
    Db(#[from] DbPoolError),
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub async fn build_state(config: AppConfig) -> Result<AppState, WiringError> {
    let db = connect(&config.database_url, MAX_DB_CONNECTIONS).await?;
    run_migrations(&db).await?;
    let client = Client::builder().timeout(config.request_timeout).build()?;
    let bilibili = BilibiliClient::new(client, config.api_base.clone());
    let credentials = Arc::new(CredentialManager::new(db.clone()));
    let pacing = Pacing::new(config.delay_min, config.delay_max);
    let engine = CrawlEngine::new(bilibili, db.clone(), Arc::clone(&credentials), pacing);
    info!(api_base = %config.api_base, "state ready");
    Ok(AppState {
        config: Arc::new(config),
        db,
        credentials,
        engine: Arc::new(engine),
        crawl: CrawlSupervisor::new(),
    })
}
