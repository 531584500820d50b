use std::fmt;
use std::sync::Arc;

use crate::{CancelMode, FetchError, FetchTask, PageCursor, QuerySpec, TaskId};

/// Enough of a task to identify it after it is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    pub task_id: TaskId,
    pub query: Arc<QuerySpec>,
    pub page_index: u32,
    pub cursor: PageCursor,
    pub attempt: u32,
}

impl From<&FetchTask> for TaskRef {
    fn from(task: &FetchTask) -> Self {
        Self {
            task_id: task.id,
            query: task.query.clone(),
            page_index: task.page_index,
            cursor: task.cursor.clone(),
            attempt: task.attempt,
        }
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task {} ({}, page {}, {}, attempt {})",
            self.task_id, self.query, self.page_index, self.cursor, self.attempt
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub task: TaskRef,
    pub error: FetchError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortCause {
    Fatal { error: FetchError, task: TaskRef },
    Cancelled { mode: CancelMode },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Aborted(AbortCause),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub emitted_count: usize,
    pub duplicate_count: usize,
    /// Tasks dropped without a result: pending at abort, drained after abort,
    /// or left over once the record cap was reached.
    pub discarded_count: usize,
    pub record_cap_reached: bool,
    pub permanent_failures: Vec<TaskFailure>,
    pub outcome: RunOutcome,
}

impl CompletionReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}
