pub mod comments;
pub mod cookie;
pub mod crawl;
