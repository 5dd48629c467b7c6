use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::http::ErrorBody;
use crate::state::AppState;
use harvest_infra::db::{clear_comments, CommentsRepoError};

#[derive(Debug, Error)]
pub enum CommentsAdminError {
    #[error("crawl running; cancel it before clearing")]
    CrawlRunning,
    #[error("db error: {0}")]
    Db(#[from] CommentsRepoError),
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    deleted: u64,
}

pub async fn delete_comments(
    State(state): State<AppState>,
) -> Result<Json<ClearResponse>, CommentsAdminError> {
    if state.crawl.status().await.state.is_running() {
        return Err(CommentsAdminError::CrawlRunning);
    }
    let deleted = clear_comments(&state.db).await?;
    Ok(Json(ClearResponse { deleted }))
}

impl IntoResponse for CommentsAdminError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            CommentsAdminError::CrawlRunning => StatusCode::CONFLICT,
            CommentsAdminError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
