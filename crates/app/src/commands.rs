use std::io::{BufRead, Write};

use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc::unbounded_channel;
use tracing::warn;

use crate::cli::{Command, CookieAction, QueryArgs};
use crate::crawl::{CancelHandle, CrawlError, CrawlEvent, CrawlOutcome, CrawlRequest};
use crate::credentials::{CredentialError, SessionCheck};
use crate::state::AppState;
use harvest_core::domain::comments::StoredComment;
use harvest_core::domain::query::CommentQuery;
use harvest_core::error::CoreError;
use harvest_infra::db::{
    clear_comments, comment_statistics_or_default, dump_comments, query_comments,
    CommentsRepoError, EXPORT_COLUMNS,
};

const CONTENT_PREVIEW_CHARS: usize = 60;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Credentials(#[from] CredentialError),
    #[error("crawl error: {0}")]
    Crawl(#[from] CrawlError),
    #[error("comments db error: {0}")]
    Comments(#[from] CommentsRepoError),
    #[error("{0}")]
    Query(#[from] CoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("{0}")]
    Refused(&'static str),
}

pub async fn run(command: Command, state: &AppState) -> Result<(), CommandError> {
    match command {
        Command::Crawl { url, max_pages } => {
            let max_pages = max_pages.unwrap_or(state.config.max_pages);
            crawl(state, CrawlRequest { url, max_pages }).await
        }
        Command::Cookie { action } => cookie(state, action).await,
        Command::Query(args) => query(state, args).await,
        Command::Stats => stats(state).await,
        Command::Clear { yes } => clear(state, yes).await,
        Command::Dump => dump(state).await,
        Command::Serve => Err(CommandError::Refused("serve is handled by main")),
    }
}

async fn crawl(state: &AppState, request: CrawlRequest) -> Result<(), CommandError> {
    let (tx, mut rx) = unbounded_channel();
    let cancel = CancelHandle::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current page");
            interrupt.cancel();
        }
    });
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(line) = describe_event(&event) {
                println!("{line}");
            }
        }
    });

    let outcome = state.engine.run(request, &tx, &cancel).await;
    drop(tx);
    printer.await?;
    match outcome? {
        CrawlOutcome::Completed(_) | CrawlOutcome::Cancelled { .. } => Ok(()),
        CrawlOutcome::Failed(err) => Err(err.into()),
    }
}

async fn cookie(state: &AppState, action: CookieAction) -> Result<(), CommandError> {
    let credentials = &state.credentials;
    match action {
        CookieAction::Set { token, ttl_days } => {
            let token = match token {
                Some(token) => token,
                None => read_stdin_line()?,
            };
            let ttl_days = ttl_days.unwrap_or(state.config.cookie_ttl_days);
            let status = credentials.save(&token, ttl_days).await?;
            println!("cookie saved; expires {}", status.expires_at.to_rfc3339());
        }
        CookieAction::Status => match credentials.status().await? {
            Some(status) => {
                println!("created:      {}", status.created_at.to_rfc3339());
                println!("expires:      {}", status.expires_at.to_rfc3339());
                println!("last checked: {}", status.last_checked_at.to_rfc3339());
                if status.needs_refresh {
                    println!("cookie expires within 3 days; save a fresh one");
                }
            }
            None => println!("no valid cookie stored"),
        },
        CookieAction::Check => match credentials.check_session(state.bilibili()).await? {
            SessionCheck::NoCredential => println!("no valid cookie stored"),
            SessionCheck::Live { uname } => {
                println!("session live as {}", uname.as_deref().unwrap_or("<unknown>"));
            }
            SessionCheck::LoggedOut => println!("session is not logged in"),
            SessionCheck::Rejected { code, message } => {
                println!("session check refused: {code} {message}");
            }
        },
        CookieAction::Clear => {
            let cleared = credentials.clear_all().await?;
            println!("invalidated {cleared} cookie(s)");
        }
        CookieAction::Purge => {
            let deleted = credentials.purge().await?;
            println!("deleted {deleted} cookie row(s)");
        }
    }
    Ok(())
}

async fn query(state: &AppState, args: QueryArgs) -> Result<(), CommandError> {
    let query = CommentQuery::from_parts(
        &args.filter,
        &args.search,
        &args.sort,
        &args.order,
        args.limit,
        args.offset,
    )?;
    let rows = query_comments(&state.db, &query).await?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for row in &rows {
        writeln!(out, "{}", format_row(row))?;
    }
    writeln!(out, "{} row(s)", rows.len())?;
    Ok(())
}

async fn stats(state: &AppState) -> Result<(), CommandError> {
    let stats = comment_statistics_or_default(&state.db).await;
    println!("comments: {}", stats.total_comments);
    println!("videos:   {}", stats.total_videos);
    println!("authors:  {}", stats.total_authors);
    match stats.latest_created_at {
        Some(at) => println!("latest:   {}", at.to_rfc3339()),
        None => println!("latest:   -"),
    }
    Ok(())
}

async fn clear(state: &AppState, yes: bool) -> Result<(), CommandError> {
    if !yes {
        return Err(CommandError::Refused(
            "refusing to delete every comment without --yes",
        ));
    }
    let deleted = clear_comments(&state.db).await?;
    println!("deleted {deleted} comment(s)");
    Ok(())
}

async fn dump(state: &AppState) -> Result<(), CommandError> {
    let rows = dump_comments(&state.db).await?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", serde_json::to_string(&EXPORT_COLUMNS)?)?;
    for row in &rows {
        writeln!(out, "{}", serde_json::to_string(&export_row(row)?)?)?;
    }
    Ok(())
}

fn read_stdin_line() -> Result<String, CommandError> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn export_row(row: &StoredComment) -> Result<Value, serde_json::Error> {
    let comment = &row.comment;
    Ok(json!([
        comment.comment_id,
        comment.video_id,
        comment.video_title,
        comment.author_name,
        comment.content,
        comment.publish_time.to_rfc3339(),
        comment.like_count,
        serde_json::to_value(&comment.replies)?,
        row.created_at.to_rfc3339(),
        row.updated_at.to_rfc3339(),
    ]))
}

fn format_row(row: &StoredComment) -> String {
    let comment = &row.comment;
    format!(
        "{}\t{}\t{}\t{} likes\t{} replies\t{}",
        comment.comment_id,
        comment.publish_time.format("%Y-%m-%d %H:%M"),
        comment.author_name,
        comment.like_count,
        comment.reply_count(),
        preview(&comment.content, CONTENT_PREVIEW_CHARS),
    )
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut cut: String = flat.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

fn describe_event(event: &CrawlEvent) -> Option<String> {
    match event {
        CrawlEvent::Resolved {
            video_id,
            aid,
            title,
        } => Some(format!("resolved {video_id} (aid {aid}): {title}")),
        CrawlEvent::PageFailed { page, message } => {
            Some(format!("page {page} failed: {message}"))
        }
        CrawlEvent::PageCompleted { page, comments } => {
            Some(format!("page {page}: {comments} comment(s)"))
        }
        CrawlEvent::RemoteStopped {
            page,
            code,
            message,
        } => Some(format!("page {page}: remote stopped paging ({code} {message})")),
        CrawlEvent::Exhausted { page } => Some(format!("page {page}: no more comments")),
        CrawlEvent::CommentFailed {
            comment_id,
            message,
            ..
        } => Some(format!("comment {comment_id} not stored: {message}")),
        CrawlEvent::Completed {
            video_id,
            aid,
            total_ingested,
            ..
        } => Some(format!(
            "done: {total_ingested} comment(s) stored for {video_id} (aid {aid})"
        )),
        CrawlEvent::Failed { stage, message } => Some(format!("failed at {stage}: {message}")),
        CrawlEvent::Cancelled { ingested } => {
            Some(format!("cancelled after {ingested} comment(s)"))
        }
        CrawlEvent::PageStarted { .. } | CrawlEvent::CommentIngested { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use harvest_core::domain::comments::{Comment, Reply};

    fn stored() -> StoredComment {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        StoredComment {
            comment: Comment {
                comment_id: "991".to_string(),
                video_id: "BV17x411w7KC".to_string(),
                video_title: "Demo".to_string(),
                author_name: "alice".to_string(),
                content: "line one\nline two".to_string(),
                publish_time: at,
                like_count: 12,
                replies: vec![Reply {
                    author_name: "bob".to_string(),
                    content: "re".to_string(),
                    time: at,
                }],
            },
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn export_row_follows_column_order() {
        let row = export_row(&stored()).unwrap();
        let values = row.as_array().unwrap();
        assert_eq!(values.len(), EXPORT_COLUMNS.len());
        assert_eq!(values[0], "991");
        assert_eq!(values[3], "alice");
        assert_eq!(values[6], 12);
        assert_eq!(values[7][0]["author_name"], "bob");
    }

    #[test]
    fn row_format_flattens_content() {
        let line = format_row(&stored());
        assert!(line.contains("line one line two"));
        assert!(line.contains("1 replies"));
        assert!(line.starts_with("991\t2024-03-01 08:30"));
    }

    #[test]
    fn preview_truncates_by_chars() {
        assert_eq!(preview("你好世界", 2), "你好…");
        assert_eq!(preview("short", 10), "short");
    }

    #[test]
    fn comment_level_success_is_quiet() {
        assert!(describe_event(&CrawlEvent::PageStarted { page: 1 }).is_none());
        assert_eq!(
            describe_event(&CrawlEvent::Cancelled { ingested: 4 }).unwrap(),
            "cancelled after 4 comment(s)"
        );
    }
}
