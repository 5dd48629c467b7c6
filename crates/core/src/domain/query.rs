use std::str::FromStr;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterKind {
    #[default]
    All,
    ByVideoId,
    ByVideoTitle,
    ByAuthor,
    ByContent,
}

impl FromStr for FilterKind {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(FilterKind::All),
            "video_id" | "video" => Ok(FilterKind::ByVideoId),
            "video_title" | "title" => Ok(FilterKind::ByVideoTitle),
            "author" | "user" => Ok(FilterKind::ByAuthor),
            "content" => Ok(FilterKind::ByContent),
            other => Err(CoreError::InvalidQuery(format!("unknown filter: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CommentFilter {
    #[default]
    All,
    VideoId(String),
    VideoTitle(String),
    Author(String),
    Content(String),
}

impl CommentFilter {
    pub fn new(kind: FilterKind, search_text: &str) -> Result<Self, CoreError> {
        if kind == FilterKind::All {
            return Ok(CommentFilter::All);
        }
        let text = search_text.trim();
        if text.is_empty() {
            return Err(CoreError::InvalidQuery(
                "search text is required for a filtered query".to_string(),
            ));
        }
        let text = text.to_string();
        Ok(match kind {
            FilterKind::All => CommentFilter::All,
            FilterKind::ByVideoId => CommentFilter::VideoId(text),
            FilterKind::ByVideoTitle => CommentFilter::VideoTitle(text),
            FilterKind::ByAuthor => CommentFilter::Author(text),
            FilterKind::ByContent => CommentFilter::Content(text),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    PublishTime,
    LikeCount,
    ReplyCount,
}

impl SortField {
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "like_count" | "likes" => SortField::LikeCount,
            "reply_count" | "replies" => SortField::ReplyCount,
            _ => SortField::PublishTime,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse_or_default(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentQuery {
    pub filter: CommentFilter,
    pub sort: SortField,
    pub order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

impl CommentQuery {
    pub const MAX_LIMIT: i64 = 1000;

    pub fn from_parts(
        filter: &str,
        search_text: &str,
        sort: &str,
        order: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Self, CoreError> {
        if !(1..=Self::MAX_LIMIT).contains(&limit) {
            return Err(CoreError::InvalidQuery(format!(
                "limit must be between 1 and {}",
                Self::MAX_LIMIT
            )));
        }
        if offset < 0 {
            return Err(CoreError::InvalidQuery("offset must not be negative".to_string()));
        }
        let kind: FilterKind = filter.parse()?;
        Ok(Self {
            filter: CommentFilter::new(kind, search_text)?,
            sort: SortField::parse_or_default(sort),
            order: SortOrder::parse_or_default(order),
            limit,
            offset,
        })
    }
}

impl Default for CommentQuery {
    fn default() -> Self {
        Self {
            filter: CommentFilter::All,
            sort: SortField::PublishTime,
            order: SortOrder::Desc,
            limit: 100,
            offset: 0,
        }
    }
}
