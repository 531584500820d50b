use sha2::{Digest, Sha256};
use url::Url;

use crate::PageCursor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRecord {
    /// Dedup key for the run.
    pub identity: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description_snippet: String,
    pub link: String,
}

impl ListingRecord {
    /// Builds a record and derives its identity from the link, falling back to
    /// a hash of title, company and location when the link is unusable.
    pub fn new(
        title: impl Into<String>,
        company: impl Into<String>,
        location: impl Into<String>,
        description_snippet: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let company = company.into();
        let location = location.into();
        let link = link.into();
        let identity = listing_identity(&link, &title, &company, &location);
        Self {
            identity,
            title,
            company,
            location,
            description_snippet: description_snippet.into(),
            link,
        }
    }
}

/// One page of results as returned by a fetch port.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchedPage {
    pub records: Vec<ListingRecord>,
    /// `None` when the source has no further pages for the query.
    pub next_cursor: Option<PageCursor>,
}

impl FetchedPage {
    pub fn new(records: Vec<ListingRecord>, next_cursor: Option<PageCursor>) -> Self {
        Self {
            records,
            next_cursor,
        }
    }

    pub fn last(records: Vec<ListingRecord>) -> Self {
        Self::new(records, None)
    }
}

pub fn listing_identity(link: &str, title: &str, company: &str, location: &str) -> String {
    if let Some(normalized) = normalize_listing_url(link) {
        return normalized;
    }
    let key = [title, company, location]
        .iter()
        .map(|part| part.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join("|");
    format!("listing:{}", short_hash(&key))
}

/// Normalizes a listing link so tracking parameters and cosmetic variants
/// collapse to one key: lowercase scheme and host, no query, no fragment,
/// no trailing slash. Returns `None` for non-http(s) or unparseable input.
pub fn normalize_listing_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut url = Url::parse(trimmed).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_query(None);
    url.set_fragment(None);

    let host = url.host_str()?.to_ascii_lowercase();
    let path = url.path().trim_end_matches('/');
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    Some(format!("{}://{host}{port}{path}", url.scheme()))
}

/// Bytes of the content digest kept in a fallback identity.
const IDENTITY_HASH_BYTES: usize = 16;

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(2 * IDENTITY_HASH_BYTES);
    for byte in digest.iter().take(IDENTITY_HASH_BYTES) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
