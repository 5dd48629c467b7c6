use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::api::CommentApi;
use super::engine::{CrawlEngine, CrawlError, CrawlRequest};
use super::events::{CancelHandle, CrawlEvent, CrawlState};

const RECENT_EVENT_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("crawl already running")]
    Busy,
    #[error("{0}")]
    Crawl(#[from] CrawlError),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlStatus {
    pub state: CrawlState,
    pub url: Option<String>,
    pub max_pages: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub ingested: usize,
    pub recent_events: VecDeque<CrawlEvent>,
}

impl CrawlStatus {
    fn record(&mut self, event: CrawlEvent) {
        self.state = self.state.after(&event);
        if matches!(event, CrawlEvent::CommentIngested { .. }) {
            self.ingested += 1;
        }
        if event.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        if self.recent_events.len() == RECENT_EVENT_LIMIT {
            self.recent_events.pop_front();
        }
        self.recent_events.push_back(event);
    }
}

#[derive(Default)]
struct Slot {
    status: CrawlStatus,
    cancel: Option<CancelHandle>,
    task: Option<JoinHandle<()>>,
}

#[derive(Clone, Default)]
pub struct CrawlSupervisor {
    slot: Arc<Mutex<Slot>>,
}

impl CrawlSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start<A>(
        &self,
        engine: Arc<CrawlEngine<A>>,
        request: CrawlRequest,
    ) -> Result<CrawlStatus, SupervisorError>
    where
        A: CommentApi + 'static,
    {
        let mut slot = self.slot.lock().await;
        if slot.status.state.is_running() {
            return Err(SupervisorError::Busy);
        }
        let prepared = engine.prepare(request).await?;
        let cancel = CancelHandle::new();
        slot.status = CrawlStatus {
            state: CrawlState::ResolvingVideo,
            url: Some(prepared.url().to_string()),
            max_pages: Some(prepared.max_pages()),
            started_at: Some(Utc::now()),
            ..CrawlStatus::default()
        };
        slot.cancel = Some(cancel.clone());
        info!(url = prepared.url(), max_pages = prepared.max_pages(), "background crawl starting");

        let (tx, mut rx) = unbounded_channel();
        let recorder = Arc::clone(&self.slot);
        let recording = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                debug!(?event, "crawl event");
                recorder.lock().await.status.record(event);
            }
        });
        slot.task = Some(tokio::spawn(async move {
            engine.execute(prepared, &tx, &cancel).await;
            drop(tx);
            let _ = recording.await;
        }));
        Ok(slot.status.clone())
    }

    pub async fn status(&self) -> CrawlStatus {
        self.slot.lock().await.status.clone()
    }

    pub async fn cancel(&self) -> bool {
        let slot = self.slot.lock().await;
        if !slot.status.state.is_running() {
            return false;
        }
        if let Some(cancel) = slot.cancel.as_ref() {
            cancel.cancel();
            info!("background crawl cancel requested");
            return true;
        }
        false
    }

    // Cancels any running crawl and waits up to `wait` for its terminal event.
    pub async fn shutdown(&self, wait: Duration) -> bool {
        let task = {
            let mut slot = self.slot.lock().await;
            if let Some(cancel) = slot.cancel.as_ref() {
                cancel.cancel();
            }
            slot.task.take()
        };
        let Some(task) = task else {
            return true;
        };
        match tokio::time::timeout(wait, task).await {
            Ok(_) => true,
            Err(_) => {
                warn!(wait_ms = wait.as_millis() as u64, "crawl still running at shutdown");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::header::HeaderMap;

    use super::*;
    use crate::crawl::engine::Pacing;
    use crate::credentials::CredentialManager;
    use harvest_core::types::video_ref::VideoRef;
    use harvest_infra::bilibili::{
        ApiResult, ReplyContent, ReplyItem, ReplyMember, ReplyPage, VideoInfo,
    };
    use harvest_infra::db::{connect_in_memory, count_comments, run_migrations, DbPool};

    struct OnePageApi;

    #[async_trait]
    impl CommentApi for OnePageApi {
        async fn resolve_video(
            &self,
            _video: &VideoRef,
            _headers: &HeaderMap,
        ) -> ApiResult<VideoInfo> {
            Ok(Ok(VideoInfo {
                aid: 42,
                bvid: "BV1xx411c7mD".to_string(),
                title: "Supervised".to_string(),
            }))
        }

        async fn fetch_page(
            &self,
            _aid: u64,
            page: u32,
            _headers: &HeaderMap,
        ) -> ApiResult<ReplyPage> {
            if page > 1 {
                return Ok(Ok(ReplyPage::default()));
            }
            let replies = (1..=3)
                .map(|rpid| ReplyItem {
                    rpid,
                    member: ReplyMember {
                        uname: "viewer".to_string(),
                    },
                    content: ReplyContent {
                        message: "hi".to_string(),
                    },
                    ctime: 1_700_000_000,
                    like: 1,
                    replies: None,
                })
                .collect();
            Ok(Ok(ReplyPage {
                replies,
                skipped: 0,
            }))
        }
    }

    async fn engine(pacing: Pacing, with_token: bool) -> (Arc<CrawlEngine<OnePageApi>>, DbPool) {
        let pool = connect_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let credentials = Arc::new(CredentialManager::new(pool.clone()));
        if with_token {
            credentials
                .save("SESSDATA=s; bili_jct=j; DedeUserID=1", 30)
                .await
                .unwrap();
        }
        let engine = Arc::new(CrawlEngine::new(OnePageApi, pool.clone(), credentials, pacing));
        (engine, pool)
    }

    fn request(max_pages: u32) -> CrawlRequest {
        CrawlRequest {
            url: "https://www.bilibili.com/video/BV1xx411c7mD".to_string(),
            max_pages,
        }
    }

    async fn wait_for_finish(supervisor: &CrawlSupervisor) -> CrawlStatus {
        for _ in 0..200 {
            let status = supervisor.status().await;
            if status.finished_at.is_some() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("crawl did not finish");
    }

    #[tokio::test]
    async fn background_crawl_records_events() {
        let (engine, pool) = engine(Pacing::none(), true).await;
        let supervisor = CrawlSupervisor::new();
        let started = supervisor.start(engine, request(5)).await.unwrap();
        assert_eq!(started.state, CrawlState::ResolvingVideo);

        let status = wait_for_finish(&supervisor).await;
        assert_eq!(status.state, CrawlState::Completed);
        assert_eq!(status.ingested, 3);
        assert!(status.recent_events.back().unwrap().is_terminal());
        assert_eq!(count_comments(&pool).await.unwrap(), 3);
        assert!(!supervisor.cancel().await);
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_running() {
        let (engine, _pool) = engine(
            Pacing::new(Duration::from_secs(60), Duration::from_secs(60)),
            true,
        )
        .await;
        let supervisor = CrawlSupervisor::new();
        supervisor.start(Arc::clone(&engine), request(3)).await.unwrap();
        assert!(matches!(
            supervisor.start(engine, request(3)).await,
            Err(SupervisorError::Busy)
        ));
        assert!(supervisor.cancel().await);
    }

    #[tokio::test]
    async fn shutdown_waits_for_cancelled_crawl() {
        let (engine, pool) = engine(
            Pacing::new(Duration::from_secs(60), Duration::from_secs(60)),
            true,
        )
        .await;
        let supervisor = CrawlSupervisor::new();
        supervisor.start(engine, request(3)).await.unwrap();
        for _ in 0..200 {
            if supervisor.status().await.ingested == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(supervisor.shutdown(Duration::from_secs(5)).await);
        let status = supervisor.status().await;
        assert_eq!(status.state, CrawlState::Cancelled);
        assert!(status.recent_events.back().unwrap().is_terminal());
        assert_eq!(count_comments(&pool).await.unwrap(), 3);
        assert!(CrawlSupervisor::new().shutdown(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn refusal_leaves_supervisor_idle() {
        let (engine, _pool) = engine(Pacing::none(), false).await;
        let supervisor = CrawlSupervisor::new();
        assert!(matches!(
            supervisor.start(engine, request(3)).await,
            Err(SupervisorError::Crawl(CrawlError::CredentialInvalid))
        ));
        assert_eq!(supervisor.status().await.state, CrawlState::Idle);
    }

    #[test]
    fn recent_events_are_capped() {
        let mut status = CrawlStatus::default();
        for page in 0..(RECENT_EVENT_LIMIT as u32 + 10) {
            status.record(CrawlEvent::PageStarted { page });
        }
        assert_eq!(status.recent_events.len(), RECENT_EVENT_LIMIT);
        assert_eq!(
            status.recent_events.front(),
            Some(&CrawlEvent::PageStarted { page: 10 })
        );
    }
}
