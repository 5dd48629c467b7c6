use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use super::DbPool;

#[derive(Debug, Error)]
pub enum CredentialsRepoError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct CredentialRecord {
    pub id: i64,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
    pub is_valid: bool,
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("last_checked_at", &self.last_checked_at)
            .field("is_valid", &self.is_valid)
            .finish_non_exhaustive()
    }
}

// Invalidates every stored credential and activates `token` in one transaction.
// A token that was stored before is reactivated with fresh timestamps.
pub async fn replace_active_credential(
    pool: &DbPool,
    token: &str,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<CredentialRecord, CredentialsRepoError> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE credentials SET is_valid = 0 WHERE is_valid = 1")
        .execute(&mut *tx)
        .await?;
    let row = sqlx::query(
        r#"
        INSERT INTO credentials (token, created_at, expires_at, last_checked_at, is_valid)
        VALUES (?, ?, ?, ?, 1)
        ON CONFLICT (token)
        DO UPDATE SET
            created_at = excluded.created_at,
            expires_at = excluded.expires_at,
            last_checked_at = excluded.last_checked_at,
            is_valid = 1
        RETURNING id, token, created_at, expires_at, last_checked_at, is_valid
        "#,
    )
    .bind(token)
    .bind(now)
    .bind(expires_at)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;
    let record = map_credential(&row)?;
    tx.commit().await?;
    Ok(record)
}

pub async fn find_active_credential(
    pool: &DbPool,
) -> Result<Option<CredentialRecord>, CredentialsRepoError> {
    let row = sqlx::query(
        r#"
        SELECT id, token, created_at, expires_at, last_checked_at, is_valid
        FROM credentials
        WHERE is_valid = 1
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(map_credential).transpose()
}

pub async fn invalidate_credentials(pool: &DbPool) -> Result<u64, CredentialsRepoError> {
    let result = sqlx::query("UPDATE credentials SET is_valid = 0 WHERE is_valid = 1")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn touch_active_credential(
    pool: &DbPool,
    checked_at: DateTime<Utc>,
) -> Result<u64, CredentialsRepoError> {
    let result = sqlx::query("UPDATE credentials SET last_checked_at = ? WHERE is_valid = 1")
        .bind(checked_at)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_credentials(pool: &DbPool) -> Result<u64, CredentialsRepoError> {
    let result = sqlx::query("DELETE FROM credentials").execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn count_valid_credentials(pool: &DbPool) -> Result<i64, CredentialsRepoError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM credentials WHERE is_valid = 1")
        .fetch_one(pool)
        .await?;
    Ok(total)
}

fn map_credential(row: &SqliteRow) -> Result<CredentialRecord, CredentialsRepoError> {
    Ok(CredentialRecord {
        id: row.try_get("id")?,
        token: row.try_get("token")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        last_checked_at: row.try_get("last_checked_at")?,
        is_valid: row.try_get("is_valid")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::db::{connect_in_memory, run_migrations};

    async fn setup_pool() -> DbPool {
        let pool = connect_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn replace_keeps_a_single_valid_row() {
        let pool = setup_pool().await;
        let now = Utc::now();
        for (idx, token) in ["t1", "t2", "t3", "t2"].into_iter().enumerate() {
            let at = now + Duration::seconds(idx as i64);
            let record = replace_active_credential(&pool, token, at, at + Duration::days(30))
                .await
                .unwrap();
            assert!(record.is_valid);
            assert_eq!(count_valid_credentials(&pool).await.unwrap(), 1);
        }
        let active = find_active_credential(&pool).await.unwrap().unwrap();
        assert_eq!(active.token, "t2");
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM credentials")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn invalidate_is_idempotent() {
        let pool = setup_pool().await;
        let now = Utc::now();
        replace_active_credential(&pool, "t1", now, now + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(invalidate_credentials(&pool).await.unwrap(), 1);
        assert_eq!(invalidate_credentials(&pool).await.unwrap(), 0);
        assert!(find_active_credential(&pool).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn touch_and_delete() {
        let pool = setup_pool().await;
        let now = Utc::now();
        replace_active_credential(&pool, "t1", now, now + Duration::days(1))
            .await
            .unwrap();
        let later = now + Duration::hours(2);
        assert_eq!(touch_active_credential(&pool, later).await.unwrap(), 1);
        let active = find_active_credential(&pool).await.unwrap().unwrap();
        assert_eq!(active.last_checked_at, later);
        assert!(!format!("{active:?}").contains("t1"));

        assert_eq!(delete_credentials(&pool).await.unwrap(), 1);
        assert!(find_active_credential(&pool).await.unwrap().is_none());
    }
}
