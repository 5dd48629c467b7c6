pub mod client;
pub mod wire;

pub use client::{ApiResult, BilibiliClient, BilibiliError, RemoteStatus, DEFAULT_API_BASE};
pub use wire::{NavInfo, ReplyContent, ReplyItem, ReplyMember, ReplyPage, VideoInfo};
