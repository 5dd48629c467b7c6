use async_trait::async_trait;
use reqwest::header::HeaderMap;

use harvest_core::types::video_ref::VideoRef;
use harvest_infra::bilibili::{ApiResult, BilibiliClient, ReplyPage, VideoInfo};

#[async_trait]
pub trait CommentApi: Send + Sync {
    async fn resolve_video(&self, video: &VideoRef, headers: &HeaderMap) -> ApiResult<VideoInfo>;

    async fn fetch_page(&self, aid: u64, page: u32, headers: &HeaderMap) -> ApiResult<ReplyPage>;
}

#[async_trait]
impl CommentApi for BilibiliClient {
    async fn resolve_video(&self, video: &VideoRef, headers: &HeaderMap) -> ApiResult<VideoInfo> {
        self.fetch_video_info(video, headers).await
    }

    async fn fetch_page(&self, aid: u64, page: u32, headers: &HeaderMap) -> ApiResult<ReplyPage> {
        self.fetch_reply_page(aid, page, headers).await
    }
}
