use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub author_name: String,
    pub content: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: String,
    pub video_id: String,
    pub video_title: String,
    pub author_name: String,
    pub content: String,
    pub publish_time: DateTime<Utc>,
    pub like_count: i64,
    pub replies: Vec<Reply>,
}

impl Comment {
    pub fn reply_count(&self) -> usize {
        self.replies.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredComment {
    #[serde(flatten)]
    pub comment: Comment,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommentStatistics {
    pub total_comments: i64,
    pub total_videos: i64,
    pub total_authors: i64,
    pub latest_created_at: Option<DateTime<Utc>>,
}
