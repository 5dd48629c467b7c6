use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use super::wire::{NavInfo, RawEnvelope, RawReplyPage, ReplyItem, ReplyPage, VideoInfo};
use harvest_core::types::video_ref::VideoRef;

pub const DEFAULT_API_BASE: &str = "https://api.bilibili.com";

const VIEW_PATH: &str = "/x/web-interface/view";
const REPLY_PATH: &str = "/x/v2/reply";
const NAV_PATH: &str = "/x/web-interface/nav";
// type=1 selects video comments, sort=2 orders by popularity.
const REPLY_TYPE_VIDEO: &str = "1";
const REPLY_SORT_HOT: &str = "2";

#[derive(Debug, Error)]
pub enum BilibiliError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("missing data: {0}")]
    MissingData(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub code: i64,
    pub message: String,
}

// Outer `Err` is transport or decoding; inner `Err` is an API-level refusal.
pub type ApiResult<T> = Result<Result<T, RemoteStatus>, BilibiliError>;

#[derive(Debug, Clone)]
pub struct BilibiliClient {
    http: reqwest::Client,
    api_base: String,
}

impl BilibiliClient {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self { http, api_base }
    }

    pub async fn fetch_video_info(
        &self,
        video: &VideoRef,
        headers: &HeaderMap,
    ) -> ApiResult<VideoInfo> {
        let (key, value) = video.lookup_param();
        let body = self.get(VIEW_PATH, &[(key, value)], headers).await?;
        decode_data(&body)
    }

    pub async fn fetch_reply_page(
        &self,
        aid: u64,
        page: u32,
        headers: &HeaderMap,
    ) -> ApiResult<ReplyPage> {
        let params = [
            ("pn", page.to_string()),
            ("type", REPLY_TYPE_VIDEO.to_string()),
            ("oid", aid.to_string()),
            ("sort", REPLY_SORT_HOT.to_string()),
        ];
        let body = self.get(REPLY_PATH, &params, headers).await?;
        match decode_data::<RawReplyPage>(&body)? {
            Ok(raw) => Ok(Ok(decode_reply_items(raw, aid, page))),
            Err(status) => Ok(Err(status)),
        }
    }

    pub async fn fetch_nav(&self, headers: &HeaderMap) -> ApiResult<NavInfo> {
        let body = self.get(NAV_PATH, &[], headers).await?;
        decode_data(&body)
    }

    async fn get(
        &self,
        path: &str,
        params: &[(&str, String)],
        headers: &HeaderMap,
    ) -> Result<String, BilibiliError> {
        let url = format!("{}{}", self.api_base, path);
        debug!(%url, "bilibili request");
        let response = self
            .http
            .get(url)
            .headers(headers.clone())
            .query(params)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

pub(crate) fn decode_data<T: DeserializeOwned>(body: &str) -> ApiResult<T> {
    let envelope: RawEnvelope = serde_json::from_str(body)
        .map_err(|err| BilibiliError::InvalidResponse(format!("envelope: {err}")))?;
    if envelope.code != 0 {
        return Ok(Err(RemoteStatus {
            code: envelope.code,
            message: envelope.message,
        }));
    }
    let data = envelope.data.ok_or(BilibiliError::MissingData("data"))?;
    let parsed = serde_json::from_value(data)
        .map_err(|err| BilibiliError::InvalidResponse(format!("data: {err}")))?;
    Ok(Ok(parsed))
}

fn decode_reply_items(raw: RawReplyPage, aid: u64, page: u32) -> ReplyPage {
    let values = raw.replies.unwrap_or_default();
    let mut replies = Vec::with_capacity(values.len());
    let mut skipped = 0;
    for value in values {
        match serde_json::from_value::<ReplyItem>(value) {
            Ok(item) => replies.push(item),
            Err(err) => {
                skipped += 1;
                warn!(aid, page, error = %err, "reply item decode failed");
            }
        }
    }
    ReplyPage { replies, skipped }
}
