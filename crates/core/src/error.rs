use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid video reference: {0}")]
    InvalidVideoRef(String),
    #[error("invalid cookie: {0}")]
    InvalidCookie(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}
