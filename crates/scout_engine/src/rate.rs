//! Concurrency cap and per-source pacing in front of a [`FetchPort`].
//!
//! Slots are handed out by a FIFO semaphore, and fetches against the same
//! source take turns on a FIFO lock that remembers when the previous fetch
//! started. Both queue in the order the submissions are first polled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use engine_logging::engine_debug;
use scout_core::{CrawlConfig, FetchError, FetchTask, FetchedPage};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::FetchPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub max_concurrent: usize,
    pub min_delay: Duration,
}

impl From<&CrawlConfig> for RateLimits {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            min_delay: config.min_delay,
        }
    }
}

type StartSlot = Arc<AsyncMutex<Option<Instant>>>;

struct Inner {
    port: Arc<dyn FetchPort>,
    limits: RateLimits,
    permits: Semaphore,
    last_start: Mutex<HashMap<String, StartSlot>>,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct RateController {
    inner: Arc<Inner>,
}

impl RateController {
    pub fn new(port: Arc<dyn FetchPort>, limits: RateLimits) -> Self {
        Self::with_cancellation(port, limits, CancellationToken::new())
    }

    /// Cancelling `cancel` fails every waiting and running fetch with
    /// `ErrorKind::Cancelled`. `max_concurrent` is clamped to
    /// `1..=Semaphore::MAX_PERMITS`.
    pub fn with_cancellation(
        port: Arc<dyn FetchPort>,
        limits: RateLimits,
        cancel: CancellationToken,
    ) -> Self {
        let limits = RateLimits {
            max_concurrent: limits.max_concurrent.clamp(1, Semaphore::MAX_PERMITS),
            ..limits
        };
        Self {
            inner: Arc::new(Inner {
                port,
                limits,
                permits: Semaphore::new(limits.max_concurrent),
                last_start: Mutex::new(HashMap::new()),
                cancel,
            }),
        }
    }

    pub fn limits(&self) -> RateLimits {
        self.inner.limits
    }

    /// Fetches currently holding a slot, including those waiting on pacing.
    pub fn outstanding(&self) -> usize {
        self.inner.limits.max_concurrent - self.inner.permits.available_permits()
    }

    /// Runs one attempt of `task`. A zero `task.timeout` means no limit.
    ///
    /// Never retries; failures, timeouts and cancellation all come back as
    /// `Err`.
    pub async fn submit(&self, task: FetchTask) -> Result<FetchedPage, FetchError> {
        let inner = &self.inner;
        let _permit = tokio::select! {
            permit = inner.permits.acquire() => permit.map_err(|_| FetchError::cancelled())?,
            _ = inner.cancel.cancelled() => return Err(FetchError::cancelled()),
        };

        let source = inner.port.source_key(&task.query);
        tokio::select! {
            _ = self.pace(&source) => {}
            _ = inner.cancel.cancelled() => return Err(FetchError::cancelled()),
        }

        engine_debug!(
            "fetch start task={} source={} page={} cursor={} attempt={}",
            task.id,
            source,
            task.page_index,
            task.cursor,
            task.attempt
        );
        let fetch = inner.port.fetch_page(&task.query, &task.cursor);
        tokio::select! {
            result = run_with_timeout(task.timeout, fetch) => result,
            _ = inner.cancel.cancelled() => Err(FetchError::cancelled()),
        }
    }

    async fn pace(&self, source: &str) {
        let min_delay = self.inner.limits.min_delay;
        if min_delay.is_zero() {
            return;
        }
        let slot = {
            let mut slots = self
                .inner
                .last_start
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let slot = slots.entry(source.to_string()).or_default();
            Arc::clone(slot)
        };

        let mut last = slot.lock().await;
        if let Some(previous) = *last {
            time::sleep_until(previous + min_delay).await;
        }
        *last = Some(Instant::now());
    }
}

async fn run_with_timeout<F>(limit: Duration, fetch: F) -> Result<FetchedPage, FetchError>
where
    F: std::future::Future<Output = Result<FetchedPage, FetchError>>,
{
    if limit.is_zero() {
        return fetch.await;
    }
    match time::timeout(limit, fetch).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::transient(format!(
            "attempt timed out after {} ms",
            limit.as_millis()
        ))),
    }
}
