//! Scout core: pure crawl state machine, query expansion and deduplication.
mod config;
mod dedup;
mod effect;
mod error;
mod listing;
mod msg;
mod query;
mod report;
mod scheduler;
mod state;
mod update;

pub use config::{CancelMode, CrawlConfig};
pub use dedup::Deduplicator;
pub use effect::Effect;
pub use error::{ConfigError, ErrorKind, FetchError};
pub use listing::{listing_identity, normalize_listing_url, FetchedPage, ListingRecord};
pub use msg::Msg;
pub use query::{FetchTask, PageCursor, QuerySpec, TaskId};
pub use report::{AbortCause, CompletionReport, RunOutcome, TaskFailure, TaskRef};
pub use scheduler::QueryScheduler;
pub use state::{RunPhase, RunState};
pub use update::update;
