use std::time::Duration;

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use engine_logging::engine_debug;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::StatusCode;
use scout_core::{FetchError, FetchedPage, PageCursor, QuerySpec};
use url::Url;

use crate::{FetchPort, ListingParser};

/// Public guest endpoint that serves job search result cards as HTML.
pub const DEFAULT_SEARCH_URL: &str =
    "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search";

#[derive(Debug, Clone)]
pub struct HttpPortSettings {
    pub search_url: Url,
    pub keyword_param: String,
    /// Query parameter carrying the offset or cursor token of a page.
    pub offset_param: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_bytes: u64,
    pub user_agent: String,
    /// Raw `Cookie` header value for sources that need a session.
    pub cookie: Option<String>,
}

impl HttpPortSettings {
    pub fn new(search_url: Url) -> Self {
        Self {
            search_url,
            keyword_param: "keywords".to_string(),
            offset_param: "start".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_bytes: 5 * 1024 * 1024,
            user_agent: format!("listing-scout/{}", env!("CARGO_PKG_VERSION")),
            cookie: None,
        }
    }
}

/// Fetches result pages from a paged HTML search endpoint.
pub struct HttpFetchPort<P> {
    settings: HttpPortSettings,
    client: reqwest::Client,
    parser: P,
}

impl<P: ListingParser> HttpFetchPort<P> {
    pub fn new(settings: HttpPortSettings, parser: P) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| FetchError::fatal(format!("http client setup failed: {err}")))?;
        Ok(Self {
            settings,
            client,
            parser,
        })
    }

    /// Search URL for one page of `query`.
    pub fn page_url(&self, query: &QuerySpec, cursor: &PageCursor) -> Url {
        let mut url = self.settings.search_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(&self.settings.keyword_param, query.keyword());
            for (name, value) in query.filters() {
                pairs.append_pair(name, value);
            }
            match cursor {
                PageCursor::Start => {
                    pairs.append_pair(&self.settings.offset_param, "0");
                }
                PageCursor::Offset(offset) => {
                    pairs.append_pair(&self.settings.offset_param, &offset.to_string());
                }
                PageCursor::Token(token) => {
                    pairs.append_pair(&self.settings.offset_param, token);
                }
            }
        }
        url
    }

    async fn download(&self, url: &Url) -> Result<(Vec<u8>, Option<String>), FetchError> {
        let mut request = self
            .client
            .get(url.clone())
            .header(USER_AGENT, &self.settings.user_agent);
        if let Some(cookie) = &self.settings.cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let max_bytes = self.settings.max_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(too_large(max_bytes, content_len));
            }
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(too_large(max_bytes, next_len));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok((bytes, content_type))
    }
}

#[async_trait::async_trait]
impl<P: ListingParser> FetchPort for HttpFetchPort<P> {
    async fn fetch_page(
        &self,
        query: &QuerySpec,
        cursor: &PageCursor,
    ) -> Result<FetchedPage, FetchError> {
        let url = self.page_url(query, cursor);
        let (bytes, content_type) = self.download(&url).await?;
        let html = decode_body(&bytes, content_type.as_deref())?;
        let records = self
            .parser
            .parse(&html, &url)
            .map_err(|err| FetchError::malformed(err.to_string()))?;

        engine_debug!("parsed {} listings from {}", records.len(), url);
        let next_cursor = if records.is_empty() {
            None
        } else {
            let offset = match cursor {
                PageCursor::Offset(offset) => *offset,
                PageCursor::Start | PageCursor::Token(_) => 0,
            };
            Some(PageCursor::Offset(offset + records.len() as u64))
        };
        Ok(FetchedPage::new(records, next_cursor))
    }

    fn source_key(&self, _query: &QuerySpec) -> String {
        self.settings
            .search_url
            .host_str()
            .unwrap_or(crate::DEFAULT_SOURCE)
            .to_ascii_lowercase()
    }
}

/// Maps a non-success status onto the run's error policy.
pub(crate) fn classify_status(status: StatusCode) -> FetchError {
    let message = format!("http status {status}");
    match status.as_u16() {
        401 | 403 => FetchError::fatal(format!("authentication rejected ({message})")),
        404 | 410 => FetchError::fatal(format!("search endpoint gone ({message})")),
        408 | 425 | 429 => FetchError::transient(message),
        code if code >= 500 => FetchError::transient(message),
        _ => FetchError::malformed(message),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::transient(format!("request timed out: {err}"));
    }
    FetchError::transient(format!("network error: {err}"))
}

fn too_large(max_bytes: u64, actual: u64) -> FetchError {
    FetchError::malformed(format!(
        "response too large (max {max_bytes}, actual {actual})"
    ))
}

/// Charset from Content-Type or BOM first, `chardetng` guess otherwise.
fn decode_body(bytes: &[u8], content_type: Option<&str>) -> Result<String, FetchError> {
    let declared = content_type
        .and_then(charset_label)
        .and_then(|label| Encoding::for_label(label.as_bytes()));
    let encoding = match (Encoding::for_bom(bytes), declared) {
        (Some((bom, _)), _) => bom,
        (None, Some(declared)) => declared,
        (None, None) => {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            detector.guess(None, true)
        }
    };
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(FetchError::malformed(format!(
            "body is not valid {}",
            encoding.name()
        )));
    }
    Ok(text.into_owned())
}

fn charset_label(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(['"', '\'']).to_string())
    })
}
