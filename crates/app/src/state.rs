use std::sync::Arc;

use crate::config::AppConfig;
use crate::crawl::{CrawlEngine, CrawlSupervisor};
use crate::credentials::CredentialManager;
use harvest_infra::bilibili::BilibiliClient;
use harvest_infra::db::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub credentials: Arc<CredentialManager>,
    pub engine: Arc<CrawlEngine<BilibiliClient>>,
    pub crawl: CrawlSupervisor,
}

impl AppState {
    pub fn bilibili(&self) -> &BilibiliClient {
        self.engine.api()
    }
}
