pub mod api;
pub mod engine;
pub mod events;
pub mod extract;
pub mod supervisor;

pub use engine::{CrawlEngine, CrawlError, CrawlOutcome, CrawlRequest, Pacing};
pub use events::{CancelHandle, CrawlEvent, CrawlState};
pub use supervisor::{CrawlStatus, CrawlSupervisor, SupervisorError};
