use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use thiserror::Error;
use tracing::warn;

use super::DbPool;
use harvest_core::domain::comments::{
    Comment, CommentStatistics, Reply, StoredComment, UpsertOutcome,
};
use harvest_core::domain::query::{CommentFilter, CommentQuery, SortField, SortOrder};

pub const EXPORT_COLUMNS: [&str; 10] = [
    "comment_id",
    "video_id",
    "video_title",
    "author_name",
    "content",
    "publish_time",
    "like_count",
    "replies",
    "created_at",
    "updated_at",
];

#[derive(Debug, Error)]
pub enum CommentsRepoError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("replies encode error: {0}")]
    Replies(#[from] serde_json::Error),
    #[error("invalid publish time for comment {0}")]
    PublishTime(String),
}

pub async fn upsert_comment(
    pool: &DbPool,
    comment: &Comment,
) -> Result<UpsertOutcome, CommentsRepoError> {
    let now = Utc::now();
    let replies = serde_json::to_string(&comment.replies)?;
    let revision: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO comments (
            comment_id,
            video_id,
            video_title,
            author_name,
            content,
            publish_time,
            like_count,
            replies,
            revision,
            created_at,
            updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
        ON CONFLICT (comment_id)
        DO UPDATE SET
            video_title = excluded.video_title,
            author_name = excluded.author_name,
            content = excluded.content,
            publish_time = excluded.publish_time,
            like_count = excluded.like_count,
            replies = excluded.replies,
            revision = comments.revision + 1,
            updated_at = excluded.updated_at
        RETURNING revision
        "#,
    )
    .bind(&comment.comment_id)
    .bind(&comment.video_id)
    .bind(&comment.video_title)
    .bind(&comment.author_name)
    .bind(&comment.content)
    .bind(comment.publish_time.timestamp())
    .bind(comment.like_count)
    .bind(replies)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    if revision == 1 {
        Ok(UpsertOutcome::Inserted)
    } else {
        Ok(UpsertOutcome::Updated)
    }
}

pub async fn find_comment(
    pool: &DbPool,
    comment_id: &str,
) -> Result<Option<StoredComment>, CommentsRepoError> {
    let row = sqlx::query(
        r#"
        SELECT comment_id, video_id, video_title, author_name, content,
               publish_time, like_count, replies, created_at, updated_at
        FROM comments
        WHERE comment_id = ?
        "#,
    )
    .bind(comment_id)
    .fetch_optional(pool)
    .await?;
    row.map(map_comment).transpose()
}

pub async fn query_comments(
    pool: &DbPool,
    query: &CommentQuery,
) -> Result<Vec<StoredComment>, CommentsRepoError> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"
        SELECT comment_id, video_id, video_title, author_name, content,
               publish_time, like_count, replies, created_at, updated_at
        FROM comments
        "#,
    );
    if let Some((column, text)) = filter_column(&query.filter) {
        builder.push(format!(" WHERE instr(lower({column}), lower("));
        builder.push_bind(text.to_string());
        builder.push(")) > 0");
    }
    builder.push(format!(
        " ORDER BY {} {}, id ASC",
        sort_expression(query.sort),
        sort_direction(query.order)
    ));
    builder.push(" LIMIT ");
    builder.push_bind(query.limit.max(0));
    builder.push(" OFFSET ");
    builder.push_bind(query.offset.max(0));

    let rows = builder.build().fetch_all(pool).await?;
    let mut comments = Vec::with_capacity(rows.len());
    for row in rows {
        comments.push(map_comment(row)?);
    }
    Ok(comments)
}

pub async fn dump_comments(pool: &DbPool) -> Result<Vec<StoredComment>, CommentsRepoError> {
    let rows = sqlx::query(
        r#"
        SELECT comment_id, video_id, video_title, author_name, content,
               publish_time, like_count, replies, created_at, updated_at
        FROM comments
        ORDER BY publish_time DESC, id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    let mut comments = Vec::with_capacity(rows.len());
    for row in rows {
        comments.push(map_comment(row)?);
    }
    Ok(comments)
}

pub async fn clear_comments(pool: &DbPool) -> Result<u64, CommentsRepoError> {
    let mut tx = pool.begin().await?;
    let deleted = sqlx::query("DELETE FROM comments")
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM sqlite_sequence WHERE name = 'comments'")
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(deleted)
}

pub async fn count_comments(pool: &DbPool) -> Result<i64, CommentsRepoError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
        .fetch_one(pool)
        .await?;
    Ok(total)
}

pub async fn fetch_comment_statistics(
    pool: &DbPool,
) -> Result<CommentStatistics, CommentsRepoError> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS total_comments,
               COUNT(DISTINCT video_id) AS total_videos,
               COUNT(DISTINCT author_name) AS total_authors,
               MAX(created_at) AS latest_created_at
        FROM comments
        "#,
    )
    .fetch_one(pool)
    .await?;
    Ok(CommentStatistics {
        total_comments: row.try_get("total_comments")?,
        total_videos: row.try_get("total_videos")?,
        total_authors: row.try_get("total_authors")?,
        latest_created_at: row.try_get("latest_created_at")?,
    })
}

pub async fn comment_statistics_or_default(pool: &DbPool) -> CommentStatistics {
    match fetch_comment_statistics(pool).await {
        Ok(stats) => stats,
        Err(err) => {
            warn!(error = %err, "comment statistics read failed");
            CommentStatistics::default()
        }
    }
}

fn filter_column(filter: &CommentFilter) -> Option<(&'static str, &str)> {
    match filter {
        CommentFilter::All => None,
        CommentFilter::VideoId(text) => Some(("video_id", text)),
        CommentFilter::VideoTitle(text) => Some(("video_title", text)),
        CommentFilter::Author(text) => Some(("author_name", text)),
        CommentFilter::Content(text) => Some(("content", text)),
    }
}

fn sort_expression(field: SortField) -> &'static str {
    match field {
        SortField::PublishTime => "publish_time",
        SortField::LikeCount => "like_count",
        SortField::ReplyCount => "json_array_length(replies)",
    }
}

fn sort_direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    }
}

fn map_comment(row: SqliteRow) -> Result<StoredComment, CommentsRepoError> {
    let comment_id: String = row.try_get("comment_id")?;
    let publish_secs: i64 = row.try_get("publish_time")?;
    let publish_time = DateTime::from_timestamp(publish_secs, 0)
        .ok_or_else(|| CommentsRepoError::PublishTime(comment_id.clone()))?;
    let replies_json: String = row.try_get("replies")?;
    let replies: Vec<Reply> = serde_json::from_str(&replies_json)?;
    Ok(StoredComment {
        comment: Comment {
            comment_id,
            video_id: row.try_get("video_id")?,
            video_title: row.try_get("video_title")?,
            author_name: row.try_get("author_name")?,
            content: row.try_get("content")?,
            publish_time,
            like_count: row.try_get("like_count")?,
            replies,
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::db::{connect, connect_in_memory, run_migrations};
    use harvest_core::domain::query::CommentFilter;

    async fn setup_pool() -> DbPool {
        let pool = connect_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn sample(comment_id: &str, likes: i64, replies: usize, minute: u32) -> Comment {
        let published = Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap();
        Comment {
            comment_id: comment_id.to_string(),
            video_id: "BV1xx411c7mD".to_string(),
            video_title: "Test Video".to_string(),
            author_name: format!("user-{comment_id}"),
            content: format!("Content of {comment_id}"),
            publish_time: published,
            like_count: likes,
            replies: (0..replies)
                .map(|idx| Reply {
                    author_name: format!("replier-{idx}"),
                    content: format!("reply {idx}"),
                    time: published + Duration::minutes(idx as i64 + 1),
                })
                .collect(),
        }
    }

    fn ids(comments: &[StoredComment]) -> Vec<&str> {
        comments
            .iter()
            .map(|stored| stored.comment.comment_id.as_str())
            .collect()
    }

    #[tokio::test]
    async fn upsert_inserts_then_updates() {
        let pool = setup_pool().await;
        let comment = sample("100", 3, 2, 0);

        assert_eq!(upsert_comment(&pool, &comment).await.unwrap(), UpsertOutcome::Inserted);
        let first = find_comment(&pool, "100").await.unwrap().unwrap();
        assert_eq!(first.created_at, first.updated_at);
        assert_eq!(first.comment, comment);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(upsert_comment(&pool, &comment).await.unwrap(), UpsertOutcome::Updated);
        let second = find_comment(&pool, "100").await.unwrap().unwrap();
        assert_eq!(second.comment, comment);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(count_comments(&pool).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_of_one_id_insert_once() {
        let path = std::env::temp_dir().join(format!(
            "harvest-comments-{}-{}.db",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let pool = connect(&format!("sqlite://{}", path.display()), 8).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let mut tasks = Vec::new();
        for likes in 0..40 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                upsert_comment(&pool, &sample("shared", likes, 0, 0)).await
            }));
        }
        let mut inserted = 0;
        for task in tasks {
            if task.await.unwrap().unwrap() == UpsertOutcome::Inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(count_comments(&pool).await.unwrap(), 1);

        pool.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }

    #[tokio::test]
    async fn update_keeps_video_id_and_refreshes_mutable_fields() {
        let pool = setup_pool().await;
        upsert_comment(&pool, &sample("7", 1, 0, 0)).await.unwrap();

        let mut changed = sample("7", 99, 3, 5);
        changed.video_id = "av42".to_string();
        changed.video_title = "Renamed".to_string();
        changed.content = "edited".to_string();
        upsert_comment(&pool, &changed).await.unwrap();

        let stored = find_comment(&pool, "7").await.unwrap().unwrap();
        assert_eq!(stored.comment.video_id, "BV1xx411c7mD");
        assert_eq!(stored.comment.video_title, "Renamed");
        assert_eq!(stored.comment.content, "edited");
        assert_eq!(stored.comment.like_count, 99);
        assert_eq!(stored.comment.replies.len(), 3);
        assert_eq!(stored.comment.publish_time, changed.publish_time);
    }

    #[tokio::test]
    async fn query_sorts_and_reverses() {
        let pool = setup_pool().await;
        upsert_comment(&pool, &sample("a", 10, 1, 3)).await.unwrap();
        upsert_comment(&pool, &sample("b", 30, 0, 1)).await.unwrap();
        upsert_comment(&pool, &sample("c", 20, 4, 2)).await.unwrap();

        let mut query = CommentQuery {
            sort: SortField::LikeCount,
            order: SortOrder::Desc,
            ..CommentQuery::default()
        };
        let desc = query_comments(&pool, &query).await.unwrap();
        assert_eq!(ids(&desc), vec!["b", "c", "a"]);

        query.order = SortOrder::Asc;
        let asc = query_comments(&pool, &query).await.unwrap();
        assert_eq!(ids(&asc), vec!["a", "c", "b"]);

        query.sort = SortField::ReplyCount;
        query.order = SortOrder::Desc;
        assert_eq!(ids(&query_comments(&pool, &query).await.unwrap()), vec!["c", "a", "b"]);

        query.sort = SortField::PublishTime;
        assert_eq!(ids(&query_comments(&pool, &query).await.unwrap()), vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn query_ties_keep_insertion_order() {
        let pool = setup_pool().await;
        for id in ["x", "y", "z"] {
            upsert_comment(&pool, &sample(id, 5, 0, 0)).await.unwrap();
        }
        for order in [SortOrder::Asc, SortOrder::Desc] {
            let query = CommentQuery {
                sort: SortField::LikeCount,
                order,
                ..CommentQuery::default()
            };
            assert_eq!(ids(&query_comments(&pool, &query).await.unwrap()), vec!["x", "y", "z"]);
        }
    }

    #[tokio::test]
    async fn query_filters_case_insensitively_and_pages() {
        let pool = setup_pool().await;
        let mut first = sample("1", 0, 0, 0);
        first.content = "Hello WORLD".to_string();
        let mut second = sample("2", 0, 0, 1);
        second.content = "100% literal".to_string();
        let third = sample("3", 0, 0, 2);
        for comment in [&first, &second, &third] {
            upsert_comment(&pool, comment).await.unwrap();
        }

        let query = CommentQuery {
            filter: CommentFilter::Content("world".to_string()),
            ..CommentQuery::default()
        };
        assert_eq!(ids(&query_comments(&pool, &query).await.unwrap()), vec!["1"]);

        let query = CommentQuery {
            filter: CommentFilter::Content("%".to_string()),
            ..CommentQuery::default()
        };
        assert_eq!(ids(&query_comments(&pool, &query).await.unwrap()), vec!["2"]);

        let query = CommentQuery {
            filter: CommentFilter::Author("USER-3".to_string()),
            ..CommentQuery::default()
        };
        assert_eq!(ids(&query_comments(&pool, &query).await.unwrap()), vec!["3"]);

        let query = CommentQuery {
            order: SortOrder::Asc,
            limit: 2,
            offset: 1,
            ..CommentQuery::default()
        };
        assert_eq!(ids(&query_comments(&pool, &query).await.unwrap()), vec!["2", "3"]);
    }

    #[tokio::test]
    async fn clear_resets_identity_counter() {
        let pool = setup_pool().await;
        upsert_comment(&pool, &sample("1", 0, 0, 0)).await.unwrap();
        upsert_comment(&pool, &sample("2", 0, 0, 0)).await.unwrap();
        assert_eq!(clear_comments(&pool).await.unwrap(), 2);
        assert_eq!(count_comments(&pool).await.unwrap(), 0);

        upsert_comment(&pool, &sample("3", 0, 0, 0)).await.unwrap();
        let id: i64 = sqlx::query_scalar("SELECT id FROM comments WHERE comment_id = '3'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn statistics_on_empty_and_filled_store() {
        let pool = setup_pool().await;
        assert_eq!(
            fetch_comment_statistics(&pool).await.unwrap(),
            CommentStatistics::default()
        );

        upsert_comment(&pool, &sample("1", 0, 0, 0)).await.unwrap();
        let mut other = sample("2", 0, 0, 0);
        other.video_id = "av1".to_string();
        other.author_name = "user-1".to_string();
        upsert_comment(&pool, &other).await.unwrap();

        let stats = fetch_comment_statistics(&pool).await.unwrap();
        assert_eq!(stats.total_comments, 2);
        assert_eq!(stats.total_videos, 2);
        assert_eq!(stats.total_authors, 1);
        assert!(stats.latest_created_at.is_some());
    }

    #[tokio::test]
    async fn dump_orders_by_publish_time() {
        let pool = setup_pool().await;
        upsert_comment(&pool, &sample("old", 0, 0, 0)).await.unwrap();
        upsert_comment(&pool, &sample("new", 0, 0, 30)).await.unwrap();
        assert_eq!(ids(&dump_comments(&pool).await.unwrap()), vec!["new", "old"]);
        assert_eq!(EXPORT_COLUMNS.len(), 10);
    }
}
