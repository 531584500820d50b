use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SubmitFetch(crate::FetchTask),
    /// Feed `Msg::RetryDue { task_id }` back after `delay`.
    ScheduleRetry {
        task_id: crate::TaskId,
        delay: Duration,
    },
    Emit(crate::ListingRecord),
    CancelInFlight,
    /// The run is settled; emitted once.
    RunFinished,
}
