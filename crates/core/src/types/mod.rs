pub mod cookie;
pub mod video_ref;
