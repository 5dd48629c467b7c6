use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::crawl::CrawlState;
use crate::state::AppState;
use harvest_infra::db::ping;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub modules: HealthModules,
}

#[derive(Debug, Serialize)]
pub struct HealthModules {
    pub database: DatabaseStatus,
    pub credential: CredentialHealth,
    pub crawl: CrawlHealth,
}

#[derive(Debug, Serialize)]
pub struct DatabaseStatus {
    pub reachable: bool,
}

#[derive(Debug, Serialize)]
pub struct CredentialHealth {
    pub present: bool,
    pub needs_refresh: bool,
}

#[derive(Debug, Serialize)]
pub struct CrawlHealth {
    pub state: CrawlState,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let reachable = match ping(&state.db).await {
        Ok(_) => true,
        Err(err) => {
            warn!(error = %err, "health db ping failed");
            false
        }
    };
    let credential = match state.credentials.status().await {
        Ok(status) => CredentialHealth {
            present: status.is_some(),
            needs_refresh: status.is_some_and(|status| status.needs_refresh),
        },
        Err(err) => {
            warn!(error = %err, "health credential lookup failed");
            CredentialHealth {
                present: false,
                needs_refresh: false,
            }
        }
    };
    let crawl_state = state.crawl.status().await.state;

    Json(HealthResponse {
        status: if reachable { "ok" } else { "degraded" },
        modules: HealthModules {
            database: DatabaseStatus { reachable },
            credential,
            crawl: CrawlHealth { state: crawl_state },
        },
    })
}
