use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::credentials::{CredentialError, CredentialStatus, SessionCheck};
use crate::http::ErrorBody;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SaveCookieBody {
    pub token: String,
    pub ttl_days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CookieStatusResponse {
    pub valid: bool,
    pub status: Option<CredentialStatus>,
}

#[derive(Debug, Serialize)]
pub struct CookieClearResponse {
    pub cleared: u64,
}

pub async fn get_cookie(
    State(state): State<AppState>,
) -> Result<Json<CookieStatusResponse>, CredentialError> {
    let status = state.credentials.status().await?;
    Ok(Json(CookieStatusResponse {
        valid: status.is_some(),
        status,
    }))
}

pub async fn put_cookie(
    State(state): State<AppState>,
    Json(body): Json<SaveCookieBody>,
) -> Result<Json<CookieStatusResponse>, CredentialError> {
    let ttl_days = body.ttl_days.unwrap_or(state.config.cookie_ttl_days);
    let status = state.credentials.save(&body.token, ttl_days).await?;
    Ok(Json(CookieStatusResponse {
        valid: true,
        status: Some(status),
    }))
}

pub async fn delete_cookie(
    State(state): State<AppState>,
) -> Result<Json<CookieClearResponse>, CredentialError> {
    let cleared = state.credentials.clear_all().await?;
    Ok(Json(CookieClearResponse { cleared }))
}

pub async fn post_cookie_check(
    State(state): State<AppState>,
) -> Result<Json<SessionCheck>, CredentialError> {
    let check = state.credentials.check_session(state.bilibili()).await?;
    Ok(Json(check))
}

impl IntoResponse for CredentialError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            CredentialError::Invalid(_) => StatusCode::BAD_REQUEST,
            CredentialError::Remote(_) => StatusCode::BAD_GATEWAY,
            CredentialError::Repo(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
