use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::ErrorBody;
use crate::state::AppState;
use harvest_core::domain::comments::{CommentStatistics, StoredComment};
use harvest_core::domain::query::CommentQuery;
use harvest_core::error::CoreError;
use harvest_infra::db::{
    comment_statistics_or_default, find_comment, query_comments, CommentsRepoError,
};

const DEFAULT_LIMIT: i64 = 50;

#[derive(Debug, Default, Deserialize)]
pub struct CommentsParams {
    pub filter: Option<String>,
    pub q: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CommentsResponse {
    pub limit: i64,
    pub offset: i64,
    pub count: usize,
    pub items: Vec<StoredComment>,
}

#[derive(Debug, Error)]
pub enum CommentsApiError {
    #[error("{0}")]
    InvalidQuery(#[from] CoreError),
    #[error("comment not found")]
    NotFound,
    #[error("db error: {0}")]
    Db(#[from] CommentsRepoError),
}

pub async fn list_comments(
    State(state): State<AppState>,
    Query(params): Query<CommentsParams>,
) -> Result<Json<CommentsResponse>, CommentsApiError> {
    let query = build_query(&params)?;
    let items = query_comments(&state.db, &query).await?;
    Ok(Json(CommentsResponse {
        limit: query.limit,
        offset: query.offset,
        count: items.len(),
        items,
    }))
}

pub async fn comment_stats(State(state): State<AppState>) -> Json<CommentStatistics> {
    Json(comment_statistics_or_default(&state.db).await)
}

pub async fn get_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
) -> Result<Json<StoredComment>, CommentsApiError> {
    let comment = find_comment(&state.db, comment_id.trim()).await?;
    comment.map(Json).ok_or(CommentsApiError::NotFound)
}

fn build_query(params: &CommentsParams) -> Result<CommentQuery, CoreError> {
    CommentQuery::from_parts(
        params.filter.as_deref().unwrap_or("all"),
        params.q.as_deref().unwrap_or_default(),
        params.sort.as_deref().unwrap_or_default(),
        params.order.as_deref().unwrap_or("desc"),
        params.limit.unwrap_or(DEFAULT_LIMIT),
        params.offset.unwrap_or(0),
    )
}

impl IntoResponse for CommentsApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            CommentsApiError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            CommentsApiError::NotFound => StatusCode::NOT_FOUND,
            CommentsApiError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
