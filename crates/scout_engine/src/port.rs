use scout_core::{FetchError, FetchedPage, PageCursor, QuerySpec};

/// Source key used when a port does not distinguish sources.
pub const DEFAULT_SOURCE: &str = "default";

/// Issues one search request against an external listing source.
#[async_trait::async_trait]
pub trait FetchPort: Send + Sync {
    async fn fetch_page(
        &self,
        query: &QuerySpec,
        cursor: &PageCursor,
    ) -> Result<FetchedPage, FetchError>;

    /// Fetches sharing a key are paced against each other.
    fn source_key(&self, _query: &QuerySpec) -> String {
        DEFAULT_SOURCE.to_string()
    }
}
