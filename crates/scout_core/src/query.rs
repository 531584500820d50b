use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::ConfigError;

pub type TaskId = u64;

/// One search: a keyword, a set of filters and a page budget.
///
/// Immutable once built; tasks share it through an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuerySpec {
    keyword: String,
    filters: BTreeMap<String, String>,
    page_limit: u32,
}

impl QuerySpec {
    pub fn new(keyword: impl Into<String>, page_limit: u32) -> Result<Self, ConfigError> {
        let keyword = keyword.into();
        if page_limit == 0 {
            return Err(ConfigError::ZeroPageLimit { keyword });
        }
        Ok(Self {
            keyword,
            filters: BTreeMap::new(),
            page_limit,
        })
    }

    /// Adds or replaces a filter. Filters form a set keyed by name.
    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn filters(&self) -> &BTreeMap<String, String> {
        &self.filters
    }

    pub fn page_limit(&self) -> u32 {
        self.page_limit
    }
}

impl fmt::Display for QuerySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.keyword)?;
        for (name, value) in &self.filters {
            write!(f, " {name}={value:?}")?;
        }
        Ok(())
    }
}

/// Position of a result page within a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum PageCursor {
    #[default]
    Start,
    Offset(u64),
    Token(String),
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageCursor::Start => write!(f, "start"),
            PageCursor::Offset(offset) => write!(f, "offset {offset}"),
            PageCursor::Token(token) => write!(f, "token {token}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub id: TaskId,
    pub query: Arc<QuerySpec>,
    pub query_index: usize,
    pub page_index: u32,
    pub cursor: PageCursor,
    /// Zero for the first try, incremented on each retry.
    pub attempt: u32,
    /// Per-attempt budget, stamped when the task is submitted.
    pub timeout: Duration,
}
