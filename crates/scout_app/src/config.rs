//! RON run file: queries, pacing and source settings for one run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scout_core::{CancelMode, ConfigError, CrawlConfig, QuerySpec};
use scout_engine::{HttpPortSettings, ListingSelectors, DEFAULT_SEARCH_URL};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RunFileError {
    #[error("failed to read run file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse run file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
    #[error(transparent)]
    Query(#[from] ConfigError),
    #[error("invalid search url {url:?}: {source}")]
    SearchUrl {
        url: String,
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryEntry {
    pub keyword: String,
    pub filters: BTreeMap<String, String>,
    pub pages: u32,
}

impl Default for QueryEntry {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            filters: BTreeMap::new(),
            pages: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorEntry {
    pub card: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub snippet: String,
    pub link: String,
}

impl Default for SelectorEntry {
    fn default() -> Self {
        let defaults = ListingSelectors::default();
        Self {
            card: defaults.card,
            title: defaults.title,
            company: defaults.company,
            location: defaults.location,
            snippet: defaults.snippet,
            link: defaults.link,
        }
    }
}

impl From<&SelectorEntry> for ListingSelectors {
    fn from(entry: &SelectorEntry) -> Self {
        Self {
            card: entry.card.clone(),
            title: entry.title.clone(),
            company: entry.company.clone(),
            location: entry.location.clone(),
            snippet: entry.snippet.clone(),
            link: entry.link.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunFile {
    pub queries: Vec<QueryEntry>,
    pub max_concurrent: usize,
    pub min_delay_ms: u64,
    pub max_retries: u32,
    pub timeout_ms: u64,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub max_records: Option<usize>,
    /// Cancel in-flight fetches as soon as a fatal error is seen.
    pub cancel_in_flight_on_fatal: bool,
    pub search_url: String,
    pub cookie: Option<String>,
    pub selectors: SelectorEntry,
}

impl Default for RunFile {
    fn default() -> Self {
        let crawl = CrawlConfig::default();
        Self {
            queries: vec![QueryEntry {
                keyword: "Software Engineer".to_string(),
                filters: BTreeMap::from([("location".to_string(), "India".to_string())]),
                pages: 1,
            }],
            max_concurrent: crawl.max_concurrent,
            min_delay_ms: millis(crawl.min_delay),
            max_retries: crawl.max_retries,
            timeout_ms: millis(crawl.per_attempt_timeout),
            retry_base_delay_ms: millis(crawl.retry_base_delay),
            retry_max_delay_ms: millis(crawl.retry_max_delay),
            max_records: Some(3),
            cancel_in_flight_on_fatal: false,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            cookie: None,
            selectors: SelectorEntry::default(),
        }
    }
}

impl RunFile {
    pub fn load(path: &Path) -> Result<Self, RunFileError> {
        let content = fs::read_to_string(path).map_err(|source| RunFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&content).map_err(|source| RunFileError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn crawl_config(&self) -> CrawlConfig {
        CrawlConfig {
            max_concurrent: self.max_concurrent,
            min_delay: Duration::from_millis(self.min_delay_ms),
            max_retries: self.max_retries,
            per_attempt_timeout: Duration::from_millis(self.timeout_ms),
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(self.retry_max_delay_ms),
            max_records: self.max_records,
            fatal_cancel_mode: if self.cancel_in_flight_on_fatal {
                CancelMode::Immediate
            } else {
                CancelMode::Graceful
            },
        }
    }

    pub fn query_specs(&self) -> Result<Vec<QuerySpec>, RunFileError> {
        self.queries
            .iter()
            .map(|entry| {
                let spec = QuerySpec::new(entry.keyword.clone(), entry.pages)?;
                Ok(entry
                    .filters
                    .iter()
                    .fold(spec, |spec, (name, value)| spec.with_filter(name, value)))
            })
            .collect()
    }

    pub fn port_settings(&self) -> Result<HttpPortSettings, RunFileError> {
        let search_url = Url::parse(&self.search_url).map_err(|source| RunFileError::SearchUrl {
            url: self.search_url.clone(),
            source,
        })?;
        let mut settings = HttpPortSettings::new(search_url);
        if self.timeout_ms > 0 {
            settings.request_timeout = Duration::from_millis(self.timeout_ms);
        }
        settings.cookie = self.cookie.clone().filter(|c| !c.trim().is_empty());
        Ok(settings)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
