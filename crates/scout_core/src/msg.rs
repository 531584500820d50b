#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Begin the run with these queries, in priority order.
    Start { queries: Vec<crate::QuerySpec> },
    /// A submitted fetch resolved.
    FetchCompleted {
        task_id: crate::TaskId,
        result: Result<crate::FetchedPage, crate::FetchError>,
    },
    /// A retry backoff timer elapsed.
    RetryDue { task_id: crate::TaskId },
    /// External cancellation.
    AbortRequested { mode: crate::CancelMode },
}
