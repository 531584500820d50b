use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use crate::{
    AbortCause, CancelMode, CompletionReport, ConfigError, CrawlConfig, Deduplicator, Effect,
    FetchError, FetchTask, FetchedPage, QueryScheduler, QuerySpec, RunOutcome, TaskFailure,
    TaskId, TaskRef,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    Completed,
    Aborted,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Aborted)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunPhase::Idle => "idle",
            RunPhase::Running => "running",
            RunPhase::Completed => "completed",
            RunPhase::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// Everything a run knows. Only [`crate::update`] mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    phase: RunPhase,
    config: CrawlConfig,
    scheduler: QueryScheduler,
    pending: VecDeque<FetchTask>,
    in_flight: BTreeMap<TaskId, FetchTask>,
    backoff: BTreeMap<TaskId, FetchTask>,
    seen: Deduplicator,
    emitted_count: usize,
    duplicate_count: usize,
    discarded: Vec<TaskRef>,
    failures: Vec<TaskFailure>,
    abort_cause: Option<AbortCause>,
    record_cap_reached: bool,
    finish_announced: bool,
}

impl RunState {
    pub fn new(config: CrawlConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            phase: RunPhase::Idle,
            config,
            scheduler: QueryScheduler::new(Vec::new()),
            pending: VecDeque::new(),
            in_flight: BTreeMap::new(),
            backoff: BTreeMap::new(),
            seen: Deduplicator::new(),
            emitted_count: 0,
            duplicate_count: 0,
            discarded: Vec::new(),
            failures: Vec::new(),
            abort_cause: None,
            record_cap_reached: false,
            finish_announced: false,
        })
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len() + self.backoff.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn emitted_count(&self) -> usize {
        self.emitted_count
    }

    pub fn failures(&self) -> &[TaskFailure] {
        &self.failures
    }

    /// Terminal phase reached and no fetch is still outstanding.
    pub fn is_settled(&self) -> bool {
        self.phase.is_terminal() && self.in_flight.is_empty()
    }

    pub fn report(&self) -> CompletionReport {
        let outcome = match &self.abort_cause {
            Some(cause) => RunOutcome::Aborted(cause.clone()),
            None => RunOutcome::Completed,
        };
        CompletionReport {
            emitted_count: self.emitted_count,
            duplicate_count: self.duplicate_count,
            discarded_count: self.discarded.len(),
            record_cap_reached: self.record_cap_reached,
            permanent_failures: self.failures.clone(),
            outcome,
        }
    }

    pub(crate) fn begin(&mut self, queries: Vec<QuerySpec>) {
        self.scheduler = QueryScheduler::new(queries);
        self.phase = RunPhase::Running;
    }

    pub(crate) fn take_in_flight(&mut self, task_id: TaskId) -> Option<FetchTask> {
        self.in_flight.remove(&task_id)
    }

    pub(crate) fn accepts_results(&self) -> bool {
        self.phase == RunPhase::Running && !self.record_cap_reached
    }

    pub(crate) fn accept_page(
        &mut self,
        task: FetchTask,
        page: FetchedPage,
        effects: &mut Vec<Effect>,
    ) {
        for record in page.records {
            if self.record_cap_reached {
                break;
            }
            if self.seen.seen(&record.identity) {
                self.duplicate_count += 1;
                continue;
            }
            self.seen.mark_seen(record.identity.clone());
            self.emitted_count += 1;
            effects.push(Effect::Emit(record));
            if self
                .config
                .max_records
                .is_some_and(|cap| self.emitted_count >= cap)
            {
                self.reach_record_cap();
            }
        }
        if !self.record_cap_reached {
            self.scheduler
                .page_completed(task.query_index, task.page_index, page.next_cursor);
        }
    }

    pub(crate) fn handle_failure(
        &mut self,
        mut task: FetchTask,
        error: FetchError,
        effects: &mut Vec<Effect>,
    ) {
        use crate::ErrorKind;

        match error.kind {
            ErrorKind::Transient | ErrorKind::Cancelled
                if task.attempt < self.config.max_retries =>
            {
                let delay = self.config.backoff_delay(task.attempt);
                task.attempt += 1;
                let task_id = task.id;
                self.backoff.insert(task_id, task);
                effects.push(Effect::ScheduleRetry { task_id, delay });
            }
            ErrorKind::Transient | ErrorKind::Cancelled | ErrorKind::Malformed => {
                self.record_failure(&task, error);
            }
            ErrorKind::Fatal => {
                let task_ref = TaskRef::from(&task);
                self.record_failure(&task, error.clone());
                let mode = self.config.fatal_cancel_mode;
                self.abort(
                    AbortCause::Fatal {
                        error,
                        task: task_ref,
                    },
                    mode,
                    effects,
                );
            }
        }
    }

    pub(crate) fn retry_due(&mut self, task_id: TaskId) {
        if let Some(task) = self.backoff.remove(&task_id) {
            self.pending.push_back(task);
        }
    }

    pub(crate) fn discard(&mut self, task: &FetchTask) {
        self.discarded.push(TaskRef::from(task));
    }

    /// Stops all further submission. In-flight fetches are left to drain.
    pub(crate) fn abort(&mut self, cause: AbortCause, mode: CancelMode, effects: &mut Vec<Effect>) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = RunPhase::Aborted;
        self.abort_cause = Some(cause);
        self.discard_waiting();
        if mode == CancelMode::Immediate && !self.in_flight.is_empty() {
            effects.push(Effect::CancelInFlight);
        }
    }

    /// Moves ready tasks into flight, detects completion and announces the
    /// settled state once.
    pub(crate) fn pump(&mut self, effects: &mut Vec<Effect>) {
        if self.phase == RunPhase::Running && !self.record_cap_reached {
            while let Some(task) = self.scheduler.next_ready() {
                self.pending.push_back(task);
            }
            while self.in_flight.len() < self.config.max_concurrent {
                let Some(mut task) = self.pending.pop_front() else {
                    break;
                };
                task.timeout = self.config.per_attempt_timeout;
                self.in_flight.insert(task.id, task.clone());
                effects.push(Effect::SubmitFetch(task));
            }
        }

        if self.phase == RunPhase::Running
            && self.in_flight.is_empty()
            && self.pending.is_empty()
            && self.backoff.is_empty()
            && (self.record_cap_reached || self.scheduler.is_exhausted())
        {
            self.phase = RunPhase::Completed;
        }

        if self.is_settled() && !self.finish_announced {
            self.finish_announced = true;
            effects.push(Effect::RunFinished);
        }
    }

    fn record_failure(&mut self, task: &FetchTask, error: FetchError) {
        self.scheduler.page_abandoned(task.query_index);
        self.failures.push(TaskFailure {
            task: TaskRef::from(task),
            error,
        });
    }

    fn reach_record_cap(&mut self) {
        self.record_cap_reached = true;
        self.discard_waiting();
    }

    fn discard_waiting(&mut self) {
        let waiting: Vec<FetchTask> = self
            .pending
            .drain(..)
            .chain(std::mem::take(&mut self.backoff).into_values())
            .collect();
        for task in &waiting {
            self.discard(task);
        }
    }
}
