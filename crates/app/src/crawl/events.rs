use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Notify;

use harvest_core::domain::comments::UpsertOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CrawlEvent {
    Resolved {
        video_id: String,
        aid: u64,
        title: String,
    },
    PageStarted {
        page: u32,
    },
    PageFailed {
        page: u32,
        message: String,
    },
    PageCompleted {
        page: u32,
        comments: usize,
    },
    RemoteStopped {
        page: u32,
        code: i64,
        message: String,
    },
    Exhausted {
        page: u32,
    },
    CommentIngested {
        page: u32,
        comment_id: String,
        outcome: UpsertOutcome,
    },
    CommentFailed {
        page: u32,
        comment_id: String,
        message: String,
    },
    Completed {
        video_id: String,
        aid: u64,
        title: String,
        total_ingested: usize,
    },
    Failed {
        stage: &'static str,
        message: String,
    },
    Cancelled {
        ingested: usize,
    },
}

impl CrawlEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CrawlEvent::Completed { .. } | CrawlEvent::Failed { .. } | CrawlEvent::Cancelled { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlState {
    #[default]
    Idle,
    ResolvingVideo,
    Paging,
    Completed,
    Failed,
    Cancelled,
}

impl CrawlState {
    pub fn is_running(self) -> bool {
        matches!(self, CrawlState::ResolvingVideo | CrawlState::Paging)
    }

    pub fn after(self, event: &CrawlEvent) -> Self {
        match event {
            CrawlEvent::Resolved { .. } => CrawlState::Paging,
            CrawlEvent::Completed { .. } => CrawlState::Completed,
            CrawlEvent::Failed { .. } => CrawlState::Failed,
            CrawlEvent::Cancelled { .. } => CrawlState::Cancelled,
            _ => self,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
