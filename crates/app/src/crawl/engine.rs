use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::header::HeaderMap;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::api::CommentApi;
use super::events::{CancelHandle, CrawlEvent};
use super::extract::build_comment;
use crate::credentials::{build_headers, CredentialError, CredentialManager};
use harvest_core::types::video_ref::VideoRef;
use harvest_infra::bilibili::{ReplyPage, VideoInfo};
use harvest_infra::db::{upsert_comment, DbPool};

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("no valid credential stored")]
    CredentialInvalid,
    #[error("page budget must be at least 1")]
    InvalidPageBudget,
    #[error("no BV or av identifier in {url}")]
    InvalidReference { url: String },
    #[error("could not resolve {video}: {message}")]
    ResolutionFailed { video: String, message: String },
    #[error("credential error: {0}")]
    Credentials(#[from] CredentialError),
}

impl CrawlError {
    pub fn stage(&self) -> &'static str {
        match self {
            CrawlError::CredentialInvalid
            | CrawlError::InvalidPageBudget
            | CrawlError::Credentials(_) => "prestart",
            CrawlError::InvalidReference { .. } | CrawlError::ResolutionFailed { .. } => "resolve",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn pick(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub url: String,
    pub max_pages: u32,
}

#[derive(Debug)]
pub struct PreparedCrawl {
    url: String,
    max_pages: u32,
    headers: HeaderMap,
}

impl PreparedCrawl {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSummary {
    pub video_id: String,
    pub aid: u64,
    pub title: String,
    pub total_ingested: usize,
    pub pages_fetched: u32,
}

#[derive(Debug)]
pub enum CrawlOutcome {
    Completed(CrawlSummary),
    Failed(CrawlError),
    Cancelled { ingested: usize },
}

pub struct CrawlEngine<A> {
    api: A,
    pool: DbPool,
    credentials: Arc<CredentialManager>,
    pacing: Pacing,
}

impl<A: CommentApi> CrawlEngine<A> {
    pub fn new(api: A, pool: DbPool, credentials: Arc<CredentialManager>, pacing: Pacing) -> Self {
        Self {
            api,
            pool,
            credentials,
            pacing,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn prepare(&self, request: CrawlRequest) -> Result<PreparedCrawl, CrawlError> {
        let active = self
            .credentials
            .current_valid()
            .await?
            .ok_or(CrawlError::CredentialInvalid)?;
        if request.max_pages == 0 {
            return Err(CrawlError::InvalidPageBudget);
        }
        if active.needs_refresh {
            warn!(expires_at = %active.expires_at, "credential expires soon");
        }
        Ok(PreparedCrawl {
            url: request.url,
            max_pages: request.max_pages,
            headers: build_headers(Some(&active.token)),
        })
    }

    pub async fn run(
        &self,
        request: CrawlRequest,
        events: &UnboundedSender<CrawlEvent>,
        cancel: &CancelHandle,
    ) -> Result<CrawlOutcome, CrawlError> {
        let prepared = self.prepare(request).await?;
        Ok(self.execute(prepared, events, cancel).await)
    }

    pub async fn execute(
        &self,
        prepared: PreparedCrawl,
        events: &UnboundedSender<CrawlEvent>,
        cancel: &CancelHandle,
    ) -> CrawlOutcome {
        let video = match VideoRef::from_url(&prepared.url) {
            Ok(video) => video,
            Err(_) => {
                return fail(
                    events,
                    CrawlError::InvalidReference {
                        url: prepared.url.clone(),
                    },
                );
            }
        };
        let info = match self.resolve(&video, &prepared.headers).await {
            Ok(info) => info,
            Err(err) => return fail(events, err),
        };
        let video_id = video.to_string();
        info!(%video_id, aid = info.aid, title = %info.title, "video resolved");
        emit(
            events,
            CrawlEvent::Resolved {
                video_id: video_id.clone(),
                aid: info.aid,
                title: info.title.clone(),
            },
        );

        let mut ingested = 0;
        let mut pages_fetched = 0;
        for page in 1..=prepared.max_pages {
            if cancel.is_cancelled() {
                return cancelled(events, ingested);
            }
            emit(events, CrawlEvent::PageStarted { page });
            match self.api.fetch_page(info.aid, page, &prepared.headers).await {
                Err(err) => {
                    warn!(page, error = %err, "page fetch failed");
                    emit(
                        events,
                        CrawlEvent::PageFailed {
                            page,
                            message: err.to_string(),
                        },
                    );
                }
                Ok(Err(status)) => {
                    info!(page, code = status.code, message = %status.message, "remote stopped paging");
                    emit(
                        events,
                        CrawlEvent::RemoteStopped {
                            page,
                            code: status.code,
                            message: status.message,
                        },
                    );
                    break;
                }
                Ok(Ok(reply_page)) => {
                    pages_fetched += 1;
                    if reply_page.replies.is_empty() && reply_page.skipped == 0 {
                        info!(page, "no more comments");
                        emit(events, CrawlEvent::Exhausted { page });
                        break;
                    }
                    ingested += self
                        .ingest_page(&reply_page, page, &video_id, &info.title, events)
                        .await;
                }
            }
            if page < prepared.max_pages {
                if cancel.is_cancelled() {
                    return cancelled(events, ingested);
                }
                let delay = self.pacing.pick();
                debug!(page, delay_ms = delay.as_millis() as u64, "pacing");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return cancelled(events, ingested),
                }
            }
        }

        let summary = CrawlSummary {
            video_id,
            aid: info.aid,
            title: info.title,
            total_ingested: ingested,
            pages_fetched,
        };
        info!(
            video_id = %summary.video_id,
            total = summary.total_ingested,
            pages = summary.pages_fetched,
            "crawl completed"
        );
        emit(
            events,
            CrawlEvent::Completed {
                video_id: summary.video_id.clone(),
                aid: summary.aid,
                title: summary.title.clone(),
                total_ingested: summary.total_ingested,
            },
        );
        CrawlOutcome::Completed(summary)
    }

    async fn resolve(&self, video: &VideoRef, headers: &HeaderMap) -> Result<VideoInfo, CrawlError> {
        match self.api.resolve_video(video, headers).await {
            Ok(Ok(info)) => Ok(info),
            Ok(Err(status)) => Err(CrawlError::ResolutionFailed {
                video: video.to_string(),
                message: status.message,
            }),
            Err(err) => Err(CrawlError::ResolutionFailed {
                video: video.to_string(),
                message: err.to_string(),
            }),
        }
    }

    async fn ingest_page(
        &self,
        reply_page: &ReplyPage,
        page: u32,
        video_id: &str,
        title: &str,
        events: &UnboundedSender<CrawlEvent>,
    ) -> usize {
        let mut stored = 0;
        for item in &reply_page.replies {
            let comment = build_comment(item, video_id, title);
            match upsert_comment(&self.pool, &comment).await {
                Ok(outcome) => {
                    stored += 1;
                    emit(
                        events,
                        CrawlEvent::CommentIngested {
                            page,
                            comment_id: comment.comment_id,
                            outcome,
                        },
                    );
                }
                Err(err) => {
                    warn!(page, comment_id = %comment.comment_id, error = %err, "comment upsert failed");
                    emit(
                        events,
                        CrawlEvent::CommentFailed {
                            page,
                            comment_id: comment.comment_id,
                            message: err.to_string(),
                        },
                    );
                }
            }
        }
        info!(page, stored, skipped = reply_page.skipped, "page ingested");
        emit(
            events,
            CrawlEvent::PageCompleted {
                page,
                comments: reply_page.replies.len(),
            },
        );
        stored
    }
}

// A closed receiver must not stop the crawl.
fn emit(events: &UnboundedSender<CrawlEvent>, event: CrawlEvent) {
    let _ = events.send(event);
}

fn fail(events: &UnboundedSender<CrawlEvent>, err: CrawlError) -> CrawlOutcome {
    warn!(stage = err.stage(), error = %err, "crawl failed");
    emit(
        events,
        CrawlEvent::Failed {
            stage: err.stage(),
            message: err.to_string(),
        },
    );
    CrawlOutcome::Failed(err)
}

fn cancelled(events: &UnboundedSender<CrawlEvent>, ingested: usize) -> CrawlOutcome {
    info!(ingested, "crawl cancelled");
    emit(events, CrawlEvent::Cancelled { ingested });
    CrawlOutcome::Cancelled { ingested }
}
