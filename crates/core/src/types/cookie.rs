use std::collections::HashMap;
use std::fmt;

use crate::error::CoreError;

pub const REQUIRED_COOKIE_KEYS: [&str; 3] = ["SESSDATA", "bili_jct", "DedeUserID"];

#[derive(Clone, PartialEq, Eq)]
pub struct SessionCookie(String);

impl SessionCookie {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for SessionCookie {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        let missing = missing_cookie_keys(trimmed);
        if !missing.is_empty() {
            return Err(CoreError::InvalidCookie(format!(
                "missing or empty: {}",
                missing.join(", ")
            )));
        }
        Ok(SessionCookie(trimmed.to_string()))
    }
}

// Never print the session secret.
impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionCookie(..)")
    }
}

pub fn parse_cookie_pairs(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|segment| {
            let (name, value) = segment.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

pub fn missing_cookie_keys(raw: &str) -> Vec<&'static str> {
    let pairs = parse_cookie_pairs(raw);
    REQUIRED_COOKIE_KEYS
        .into_iter()
        .filter(|key| pairs.get(*key).is_none_or(|value| value.is_empty()))
        .collect()
}

pub fn validate_cookie(raw: &str) -> bool {
    missing_cookie_keys(raw).is_empty()
}
