use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::credentials::MAX_TTL_DAYS;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: SocketAddr,
    pub database_url: String,
    pub api_base: String,
    pub request_timeout: Duration,
    pub delay_min: Duration,
    pub delay_max: Duration,
    pub max_pages: u32,
    pub cookie_ttl_days: u32,
    pub admin_token: Option<String>,
    pub cors_allow_origins: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid socket address: {0}")]
    InvalidSocket(String),
    #[error("invalid number for {0}: {1}")]
    InvalidNumber(&'static str, String),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr_raw = read_string("HARVEST_HTTP_ADDR", "127.0.0.1:8080");
        let http_addr = http_addr_raw
            .parse()
            .map_err(|_| ConfigError::InvalidSocket(http_addr_raw.clone()))?;
        let database_url = read_string("HARVEST_DATABASE_URL", "sqlite:bili-harvest.db?mode=rwc");
        if database_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue("HARVEST_DATABASE_URL", database_url));
        }
        let api_base = read_string("HARVEST_API_BASE", harvest_infra::bilibili::DEFAULT_API_BASE);
        if !api_base.starts_with("http://") && !api_base.starts_with("https://") {
            return Err(ConfigError::InvalidValue("HARVEST_API_BASE", api_base));
        }
        let request_timeout_secs = read_u64("HARVEST_REQUEST_TIMEOUT_SECS", 15)?;
        let delay_min_secs = read_f64("HARVEST_DELAY_MIN_SECS", 3.0)?;
        let delay_max_secs = read_f64("HARVEST_DELAY_MAX_SECS", 7.0)?;
        let (delay_min, delay_max) = delay_window(delay_min_secs, delay_max_secs)?;
        let max_pages = read_u32("HARVEST_MAX_PAGES", 10)?;
        if max_pages == 0 {
            return Err(ConfigError::InvalidValue("HARVEST_MAX_PAGES", "0".to_string()));
        }
        let cookie_ttl_days = cookie_ttl(read_u32("HARVEST_COOKIE_TTL_DAYS", 30)?)?;
        let admin_token = read_optional_string("HARVEST_ADMIN_TOKEN");
        let cors_allow_origins = read_list("HARVEST_CORS_ALLOW_ORIGINS");

        Ok(Self {
            http_addr,
            database_url,
            api_base,
            request_timeout: Duration::from_secs(request_timeout_secs),
            delay_min,
            delay_max,
            max_pages,
            cookie_ttl_days,
            admin_token,
            cors_allow_origins,
        })
    }
}

fn delay_window(min_secs: f64, max_secs: f64) -> Result<(Duration, Duration), ConfigError> {
    if !min_secs.is_finite() || min_secs < 0.0 {
        return Err(ConfigError::InvalidValue("HARVEST_DELAY_MIN_SECS", min_secs.to_string()));
    }
    if !max_secs.is_finite() || max_secs < min_secs {
        return Err(ConfigError::InvalidValue(
            "HARVEST_DELAY_MAX_SECS",
            format!("{max_secs} (must be >= {min_secs})"),
        ));
    }
    Ok((Duration::from_secs_f64(min_secs), Duration::from_secs_f64(max_secs)))
}

fn cookie_ttl(days: u32) -> Result<u32, ConfigError> {
    if days == 0 || days > MAX_TTL_DAYS {
        return Err(ConfigError::InvalidValue(
            "HARVEST_COOKIE_TTL_DAYS",
            format!("{days} (must be 1..={MAX_TTL_DAYS})"),
        ));
    }
    Ok(days)
}

pub fn load_dotenv() -> Result<(), std::io::Error> {
    let path = Path::new(".env");
    if !path.exists() {
        return Ok(());
    }
    let contents = std::fs::read_to_string(path)?;
    for (key, value) in parse_dotenv(&contents) {
        if std::env::var_os(&key).is_none() {
            // Safety: invoked during startup before any threads are spawned.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

fn read_string(key: &'static str, default: &'static str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn read_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|_| ConfigError::InvalidNumber(key, raw))
}

fn read_u32(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|_| ConfigError::InvalidNumber(key, raw))
}

fn read_f64(key: &'static str, default: f64) -> Result<f64, ConfigError> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber(key, raw))
}

fn read_optional_string(key: &'static str) -> Option<String> {
    let value = std::env::var(key).unwrap_or_default();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn read_list(key: &'static str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .filter_map(parse_dotenv_line)
        .collect()
}

fn parse_dotenv_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = parse_dotenv_value(value.trim());
    Some((key.to_string(), value))
}

fn parse_dotenv_value(value: &str) -> String {
    if let Some(stripped) = value.strip_prefix('"').and_then(|inner| inner.strip_suffix('"')) {
        return unescape_double_quoted(stripped);
    }
    if let Some(stripped) = value.strip_prefix('\'').and_then(|inner| inner.strip_suffix('\'')) {
        return stripped.to_string();
    }
    value.to_string()
}

fn unescape_double_quoted(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => output.push('\n'),
                Some('r') => output.push('\r'),
                Some('t') => output.push('\t'),
                Some('\\') => output.push('\\'),
                Some('"') => output.push('"'),
                Some(other) => {
                    output.push('\\');
                    output.push(other);
                }
                None => output.push('\\'),
            }
        } else {
            output.push(ch);
        }
    }
    output
}
