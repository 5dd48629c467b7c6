use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub(crate) struct RawEnvelope {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoInfo {
    pub aid: u64,
    #[serde(default)]
    pub bvid: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyItem {
    pub rpid: u64,
    pub member: ReplyMember,
    pub content: ReplyContent,
    pub ctime: i64,
    #[serde(default)]
    pub like: i64,
    #[serde(default)]
    pub replies: Option<Vec<ReplyItem>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyMember {
    pub uname: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyContent {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawReplyPage {
    #[serde(default)]
    pub replies: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default)]
pub struct ReplyPage {
    pub replies: Vec<ReplyItem>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NavInfo {
    #[serde(rename = "isLogin", default)]
    pub is_login: bool,
    #[serde(default)]
    pub uname: Option<String>,
}
