use chrono::{DateTime, Duration, TimeDelta, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use harvest_core::error::CoreError;
use harvest_core::types::cookie::{validate_cookie, SessionCookie};
use harvest_infra::bilibili::{BilibiliClient, BilibiliError};
use harvest_infra::db::{
    delete_credentials, find_active_credential, invalidate_credentials,
    replace_active_credential, touch_active_credential, CredentialRecord, CredentialsRepoError,
    DbPool,
};

const REFRESH_WINDOW_DAYS: i64 = 3;
pub const MAX_TTL_DAYS: u32 = 3650;

const BASE_HEADERS: [(&str, &str); 13] = [
    (
        "user-agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    ),
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
    ),
    ("accept-language", "zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7,zh-TW;q=0.6"),
    (
        "sec-ch-ua",
        "\"Google Chrome\";v=\"131\", \"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\"",
    ),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", "\"Windows\""),
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "none"),
    ("sec-fetch-user", "?1"),
    ("upgrade-insecure-requests", "1"),
    ("cache-control", "no-cache"),
    ("pragma", "no-cache"),
];

const SESSION_HEADERS: [(&str, &str); 3] = [
    ("origin", "https://www.bilibili.com"),
    ("host", "api.bilibili.com"),
    ("referer", "https://www.bilibili.com"),
];

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("{0}")]
    Invalid(#[from] CoreError),
    #[error("credential store error: {0}")]
    Repo(#[from] CredentialsRepoError),
    #[error("session check failed: {0}")]
    Remote(#[from] BilibiliError),
}

#[derive(Clone)]
pub struct ActiveCredential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub needs_refresh: bool,
}

impl std::fmt::Debug for ActiveCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveCredential")
            .field("expires_at", &self.expires_at)
            .field("needs_refresh", &self.needs_refresh)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
    pub needs_refresh: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionCheck {
    NoCredential,
    Live { uname: Option<String> },
    LoggedOut,
    Rejected { code: i64, message: String },
}

pub struct CredentialManager {
    pool: DbPool,
    write_lock: Mutex<()>,
}

impl CredentialManager {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    pub fn validate(token: &str) -> bool {
        validate_cookie(token)
    }

    pub async fn save(
        &self,
        token: &str,
        ttl_days: u32,
    ) -> Result<CredentialStatus, CredentialError> {
        let cookie = SessionCookie::try_from(token)?;
        if ttl_days > MAX_TTL_DAYS {
            return Err(CoreError::InvalidCookie(format!(
                "ttl of {ttl_days} days exceeds {MAX_TTL_DAYS}"
            ))
            .into());
        }
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let expires_at = TimeDelta::try_days(i64::from(ttl_days))
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| CoreError::InvalidCookie(format!("ttl of {ttl_days} days overflows")))?;
        let record = replace_active_credential(&self.pool, cookie.as_str(), now, expires_at).await?;
        info!(id = record.id, %expires_at, "credential saved");
        Ok(project_status(&record, now))
    }

    pub async fn current_valid(&self) -> Result<Option<ActiveCredential>, CredentialError> {
        let now = Utc::now();
        let record = find_active_credential(&self.pool).await?;
        Ok(record.map(|record| ActiveCredential {
            needs_refresh: needs_refresh(record.expires_at, now),
            expires_at: record.expires_at,
            token: record.token,
        }))
    }

    pub async fn clear_all(&self) -> Result<u64, CredentialError> {
        let _guard = self.write_lock.lock().await;
        let cleared = invalidate_credentials(&self.pool).await?;
        info!(cleared, "credentials invalidated");
        Ok(cleared)
    }

    pub async fn purge(&self) -> Result<u64, CredentialError> {
        let _guard = self.write_lock.lock().await;
        let deleted = delete_credentials(&self.pool).await?;
        info!(deleted, "credentials purged");
        Ok(deleted)
    }

    pub async fn mark_checked(&self) -> Result<bool, CredentialError> {
        let touched = touch_active_credential(&self.pool, Utc::now()).await?;
        Ok(touched > 0)
    }

    pub async fn status(&self) -> Result<Option<CredentialStatus>, CredentialError> {
        let now = Utc::now();
        let record = find_active_credential(&self.pool).await?;
        Ok(record.map(|record| project_status(&record, now)))
    }

    pub async fn request_headers(&self) -> HeaderMap {
        match self.current_valid().await {
            Ok(active) => build_headers(active.as_ref().map(|active| active.token.as_str())),
            Err(err) => {
                warn!(error = %err, "credential lookup failed; using base headers");
                build_headers(None)
            }
        }
    }

    pub async fn check_session(
        &self,
        client: &BilibiliClient,
    ) -> Result<SessionCheck, CredentialError> {
        let Some(active) = self.current_valid().await? else {
            return Ok(SessionCheck::NoCredential);
        };
        let headers = build_headers(Some(&active.token));
        let check = match client.fetch_nav(&headers).await? {
            Ok(nav) if nav.is_login => SessionCheck::Live { uname: nav.uname },
            Ok(_) => SessionCheck::LoggedOut,
            Err(status) => SessionCheck::Rejected {
                code: status.code,
                message: status.message,
            },
        };
        if matches!(check, SessionCheck::Live { .. }) {
            self.mark_checked().await?;
        }
        Ok(check)
    }
}

pub fn needs_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now + Duration::days(REFRESH_WINDOW_DAYS) > expires_at
}

pub fn build_headers(token: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in BASE_HEADERS {
        insert_header(&mut headers, name, value);
    }
    if let Some(token) = token {
        insert_header(&mut headers, "cookie", token);
        for (name, value) in SESSION_HEADERS {
            insert_header(&mut headers, name, value);
        }
    }
    headers
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(name), value);
        }
        Err(_) => warn!(header = name, "header value rejected; omitted"),
    }
}

fn project_status(record: &CredentialRecord, now: DateTime<Utc>) -> CredentialStatus {
    CredentialStatus {
        created_at: record.created_at,
        expires_at: record.expires_at,
        last_checked_at: record.last_checked_at,
        needs_refresh: needs_refresh(record.expires_at, now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_infra::db::{connect, connect_in_memory, count_valid_credentials, run_migrations};

    const TOKEN_A: &str = "SESSDATA=a1; bili_jct=j1; DedeUserID=100";
    const TOKEN_B: &str = "buvid3=x; DedeUserID=200; bili_jct=j2; SESSDATA=a2";

    async fn setup_manager() -> (CredentialManager, DbPool) {
        let pool = connect_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        (CredentialManager::new(pool.clone()), pool)
    }

    #[test]
    fn validate_requires_all_session_keys() {
        assert!(CredentialManager::validate(TOKEN_A));
        assert!(CredentialManager::validate(TOKEN_B));
        assert!(!CredentialManager::validate("SESSDATA=a; bili_jct=b"));
        assert!(!CredentialManager::validate("SESSDATA=; bili_jct=b; DedeUserID=1"));
        assert!(!CredentialManager::validate(";;=;garbage"));
        assert!(!CredentialManager::validate(""));
    }

    #[test]
    fn refresh_window_is_three_days() {
        let now = Utc::now();
        assert!(needs_refresh(now + Duration::days(2), now));
        assert!(!needs_refresh(now + Duration::days(4), now));
    }

    #[test]
    fn headers_without_token_are_base_only() {
        let headers = build_headers(None);
        assert!(headers.contains_key("user-agent"));
        assert!(!headers.contains_key("cookie"));
        assert!(!headers.contains_key("referer"));

        let headers = build_headers(Some(TOKEN_A));
        assert_eq!(headers.get("cookie").unwrap(), TOKEN_A);
        assert_eq!(headers.get("host").unwrap(), "api.bilibili.com");
        assert_eq!(headers.get("origin").unwrap(), "https://www.bilibili.com");
    }

    #[test]
    fn unencodable_cookie_is_omitted() {
        let headers = build_headers(Some("SESSDATA=a\nb"));
        assert!(!headers.contains_key("cookie"));
        assert!(headers.contains_key("referer"));
    }

    #[tokio::test]
    async fn save_rejects_invalid_and_keeps_one_active() {
        let (manager, pool) = setup_manager().await;
        assert!(matches!(
            manager.save("SESSDATA=only", 30).await,
            Err(CredentialError::Invalid(_))
        ));
        assert!(manager.current_valid().await.unwrap().is_none());

        manager.save(TOKEN_A, 30).await.unwrap();
        manager.save(TOKEN_B, 30).await.unwrap();
        assert_eq!(count_valid_credentials(&pool).await.unwrap(), 1);
        let active = manager.current_valid().await.unwrap().unwrap();
        assert_eq!(active.token, TOKEN_B);
        assert!(!active.needs_refresh);
    }

    #[tokio::test]
    async fn oversized_ttl_is_rejected_without_saving() {
        let (manager, pool) = setup_manager().await;
        for ttl_days in [u32::MAX, MAX_TTL_DAYS + 1] {
            assert!(matches!(
                manager.save(TOKEN_A, ttl_days).await,
                Err(CredentialError::Invalid(CoreError::InvalidCookie(_)))
            ));
        }
        assert_eq!(count_valid_credentials(&pool).await.unwrap(), 0);
        let status = manager.save(TOKEN_A, MAX_TTL_DAYS).await.unwrap();
        assert!(status.expires_at > status.created_at + Duration::days(3000));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_leave_one_valid_credential() {
        let path = std::env::temp_dir().join(format!(
            "harvest-credentials-{}-{}.db",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let pool = connect(&format!("sqlite://{}", path.display()), 8).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let managers: Vec<_> = (0..4)
            .map(|_| std::sync::Arc::new(CredentialManager::new(pool.clone())))
            .collect();

        let mut tasks = Vec::new();
        for i in 0..40 {
            let manager = std::sync::Arc::clone(&managers[i % managers.len()]);
            tasks.push(tokio::spawn(async move {
                let token = format!("SESSDATA=s{i}; bili_jct=j{i}; DedeUserID={i}");
                manager.save(&token, 30).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(count_valid_credentials(&pool).await.unwrap(), 1);
        assert!(managers[0].current_valid().await.unwrap().is_some());

        pool.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }

    #[tokio::test]
    async fn short_ttl_flags_refresh() {
        let (manager, _pool) = setup_manager().await;
        let status = manager.save(TOKEN_A, 1).await.unwrap();
        assert!(status.needs_refresh);
        assert!(manager.current_valid().await.unwrap().unwrap().needs_refresh);
    }

    #[tokio::test]
    async fn clear_all_is_idempotent_and_headers_fall_back() {
        let (manager, _pool) = setup_manager().await;
        manager.save(TOKEN_A, 30).await.unwrap();
        assert!(manager.request_headers().await.contains_key("cookie"));
        assert_eq!(manager.clear_all().await.unwrap(), 1);
        assert_eq!(manager.clear_all().await.unwrap(), 0);
        assert!(manager.status().await.unwrap().is_none());
        assert!(!manager.request_headers().await.contains_key("cookie"));
        assert!(!manager.mark_checked().await.unwrap());
    }

    #[tokio::test]
    async fn purge_removes_rows() {
        let (manager, _pool) = setup_manager().await;
        manager.save(TOKEN_A, 30).await.unwrap();
        assert!(manager.mark_checked().await.unwrap());
        assert_eq!(manager.purge().await.unwrap(), 1);
        assert!(manager.current_valid().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn check_session_without_credential_skips_remote() {
        let (manager, _pool) = setup_manager().await;
        let client = BilibiliClient::new(reqwest::Client::new(), "http://127.0.0.1:9");
        assert_eq!(
            manager.check_session(&client).await.unwrap(),
            SessionCheck::NoCredential
        );
    }
}
