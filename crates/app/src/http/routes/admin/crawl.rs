use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::crawl::{CrawlError, CrawlRequest, CrawlStatus, SupervisorError};
use crate::http::ErrorBody;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartCrawlBody {
    pub url: String,
    pub max_pages: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

pub async fn post_crawl(
    State(state): State<AppState>,
    Json(body): Json<StartCrawlBody>,
) -> Result<(StatusCode, Json<CrawlStatus>), SupervisorError> {
    let request = CrawlRequest {
        url: body.url,
        max_pages: body.max_pages.unwrap_or(state.config.max_pages),
    };
    let status = state.crawl.start(Arc::clone(&state.engine), request).await?;
    Ok((StatusCode::ACCEPTED, Json(status)))
}

pub async fn get_crawl(State(state): State<AppState>) -> Json<CrawlStatus> {
    Json(state.crawl.status().await)
}

pub async fn delete_crawl(State(state): State<AppState>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.crawl.cancel().await,
    })
}

impl IntoResponse for SupervisorError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            SupervisorError::Busy => StatusCode::CONFLICT,
            SupervisorError::Crawl(CrawlError::CredentialInvalid) => StatusCode::PRECONDITION_FAILED,
            SupervisorError::Crawl(CrawlError::InvalidPageBudget)
            | SupervisorError::Crawl(CrawlError::InvalidReference { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            SupervisorError::Crawl(CrawlError::ResolutionFailed { .. }) => StatusCode::BAD_GATEWAY,
            SupervisorError::Crawl(CrawlError::Credentials(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
