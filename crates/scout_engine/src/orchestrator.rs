//! Async driver around the core run state machine.
//!
//! The driver owns the [`RunState`] and is the only code that touches it:
//! it waits for the next fetch result, retry timer or abort request, feeds
//! it through [`update`], and carries out the returned effects before
//! waiting again. Fetches run concurrently behind the [`RateController`];
//! records reach the sink one at a time in arrival order.

use std::sync::Arc;
use std::time::Instant;

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use scout_core::{
    update, AbortCause, CancelMode, CompletionReport, ConfigError, CrawlConfig, Effect,
    FetchError, Msg, QuerySpec, RunOutcome, RunPhase, RunState, TaskRef,
};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{FetchPort, OutputSink, RateController, RateLimits};

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid run configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("run aborted by {error} on {task}")]
    Fatal {
        error: FetchError,
        task: TaskRef,
        report: Box<CompletionReport>,
    },
}

/// Requests cancellation of a run from anywhere.
///
/// `Graceful` stops new submissions and lets in-flight fetches finish;
/// `Immediate` additionally cancels them. A graceful abort can be upgraded
/// to an immediate one later.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    immediate: CancellationToken,
    graceful: CancellationToken,
}

impl AbortHandle {
    fn new() -> Self {
        let immediate = CancellationToken::new();
        let graceful = immediate.child_token();
        Self {
            immediate,
            graceful,
        }
    }

    pub fn abort(&self, mode: CancelMode) {
        match mode {
            CancelMode::Graceful => self.graceful.cancel(),
            CancelMode::Immediate => self.immediate.cancel(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.graceful.is_cancelled()
    }

    fn requested_mode(&self) -> CancelMode {
        if self.immediate.is_cancelled() {
            CancelMode::Immediate
        } else {
            CancelMode::Graceful
        }
    }
}

/// One crawl run: `new`, optionally grab an [`AbortHandle`] or phase
/// receiver, then `start`.
pub struct CrawlOrchestrator {
    port: Arc<dyn FetchPort>,
    sink: Arc<dyn OutputSink>,
    config: CrawlConfig,
    abort: AbortHandle,
    phase_tx: watch::Sender<RunPhase>,
}

impl CrawlOrchestrator {
    pub fn new(port: Arc<dyn FetchPort>, sink: Arc<dyn OutputSink>, config: CrawlConfig) -> Self {
        let (phase_tx, _) = watch::channel(RunPhase::Idle);
        Self {
            port,
            sink,
            config,
            abort: AbortHandle::new(),
            phase_tx,
        }
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase_tx.subscribe()
    }

    /// Runs the queries to completion or abort.
    ///
    /// Cancellation through the [`AbortHandle`] still returns `Ok` with an
    /// aborted outcome; only a fatal fetch error is returned as `Err`.
    pub async fn start(self, queries: Vec<QuerySpec>) -> Result<CompletionReport, CrawlError> {
        let mut state = RunState::new(self.config.clone())?;
        // Cancelled by an immediate abort or by the run itself on a fatal error.
        let in_flight = self.abort.immediate.child_token();
        let rate = RateController::with_cancellation(
            self.port.clone(),
            RateLimits::from(&self.config),
            in_flight.clone(),
        );
        let started = Instant::now();
        engine_info!(
            "run start queries={} max_concurrent={} min_delay_ms={} max_retries={}",
            queries.len(),
            self.config.max_concurrent,
            self.config.min_delay.as_millis(),
            self.config.max_retries
        );

        let mut work: FuturesUnordered<BoxFuture<'static, Msg>> = FuturesUnordered::new();
        let mut abort_seen = false;
        let mut failures_logged = 0;
        let mut next = Some(Msg::Start { queries });

        while let Some(msg) = next.take() {
            let (updated, effects) = update(state, msg);
            state = updated;
            self.phase_tx.send_replace(state.phase());
            for failure in &state.failures()[failures_logged..] {
                engine_warn!("permanent failure {}: {}", failure.task, failure.error);
            }
            failures_logged = state.failures().len();
            for effect in effects {
                self.apply(effect, &rate, &in_flight, &mut work);
            }
            if state.is_settled() {
                break;
            }

            let accepts_abort = !abort_seen && !state.phase().is_terminal();
            // Abort first: fetches cut off by an immediate abort resolve in the
            // same instant and must reach `update` after the phase change.
            next = tokio::select! {
                biased;
                _ = self.abort.graceful.cancelled(), if accepts_abort => {
                    abort_seen = true;
                    let mode = self.abort.requested_mode();
                    engine_warn!("abort requested mode={:?}", mode);
                    Some(Msg::AbortRequested { mode })
                }
                Some(msg) = work.next() => Some(msg),
                else => {
                    engine_error!(
                        "run stalled with nothing outstanding phase={} pending={}",
                        state.phase(),
                        state.pending_len()
                    );
                    None
                }
            };
        }

        let report = state.report();
        engine_info!(
            "run finished outcome={:?} emitted={} duplicates={} failures={} discarded={} elapsed_ms={}",
            report.outcome,
            report.emitted_count,
            report.duplicate_count,
            report.permanent_failures.len(),
            report.discarded_count,
            started.elapsed().as_millis()
        );

        match &report.outcome {
            RunOutcome::Aborted(AbortCause::Fatal { error, task }) => Err(CrawlError::Fatal {
                error: error.clone(),
                task: task.clone(),
                report: Box::new(report.clone()),
            }),
            _ => Ok(report),
        }
    }

    fn apply(
        &self,
        effect: Effect,
        rate: &RateController,
        in_flight: &CancellationToken,
        work: &mut FuturesUnordered<BoxFuture<'static, Msg>>,
    ) {
        match effect {
            Effect::SubmitFetch(task) => {
                let rate = rate.clone();
                let task_id = task.id;
                work.push(
                    async move {
                        let result = rate.submit(task).await;
                        Msg::FetchCompleted { task_id, result }
                    }
                    .boxed(),
                );
            }
            Effect::ScheduleRetry { task_id, delay } => {
                engine_info!("retry scheduled task={} delay_ms={}", task_id, delay.as_millis());
                work.push(
                    tokio::time::sleep(delay)
                        .map(move |_| Msg::RetryDue { task_id })
                        .boxed(),
                );
            }
            Effect::Emit(record) => {
                engine_debug!("emit identity={}", record.identity);
                if let Err(err) = self.sink.emit(&record) {
                    engine_warn!("sink failed for {}: {}", record.identity, err);
                }
            }
            Effect::CancelInFlight => {
                engine_warn!("cancelling in-flight fetches");
                in_flight.cancel();
            }
            Effect::RunFinished => {
                engine_debug!("run settled");
            }
        }
    }
}
