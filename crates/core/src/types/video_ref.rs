use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

static BV_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"BV[0-9A-Za-z]{10}").expect("bv pattern"));
static AV_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"av([0-9]+)").expect("av pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VideoRef {
    Bv(String),
    Av(u64),
}

impl VideoRef {
    pub fn from_url(input: &str) -> Result<Self, CoreError> {
        let trimmed = input.trim();
        if let Some(found) = BV_PATTERN.find(trimmed) {
            return Ok(VideoRef::Bv(found.as_str().to_string()));
        }
        if let Some(captures) = AV_PATTERN.captures(trimmed) {
            let digits = &captures[1];
            let aid = digits
                .parse::<u64>()
                .map_err(|_| CoreError::InvalidVideoRef(trimmed.to_string()))?;
            return Ok(VideoRef::Av(aid));
        }
        Err(CoreError::InvalidVideoRef(trimmed.to_string()))
    }

    pub fn lookup_param(&self) -> (&'static str, String) {
        match self {
            VideoRef::Bv(bvid) => ("bvid", bvid.clone()),
            VideoRef::Av(aid) => ("aid", aid.to_string()),
        }
    }
}

impl fmt::Display for VideoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoRef::Bv(bvid) => f.write_str(bvid),
            VideoRef::Av(aid) => write!(f, "av{aid}"),
        }
    }
}
