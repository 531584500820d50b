//! Scout engine: async fetch pacing, run driver and source adapters.
mod http;
mod orchestrator;
mod parse;
mod port;
mod rate;
mod sink;

pub use http::{HttpFetchPort, HttpPortSettings, DEFAULT_SEARCH_URL};
pub use orchestrator::{AbortHandle, CrawlError, CrawlOrchestrator};
pub use parse::{ListingParser, ListingSelectors, ParseError, SelectorListingParser};
pub use port::{FetchPort, DEFAULT_SOURCE};
pub use rate::{RateController, RateLimits};
pub use sink::{ConsoleSink, JsonLinesSink, OutputSink, SinkError};
