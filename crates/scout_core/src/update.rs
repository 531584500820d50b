use crate::{AbortCause, Effect, Msg, RunPhase, RunState};

/// Pure update function: applies a message to run state and returns the
/// effects the driver must carry out.
pub fn update(mut state: RunState, msg: Msg) -> (RunState, Vec<Effect>) {
    let mut effects = Vec::new();
    match msg {
        Msg::Start { queries } => {
            if state.phase() != RunPhase::Idle {
                return (state, effects);
            }
            state.begin(queries);
        }
        Msg::FetchCompleted { task_id, result } => {
            // Unknown ids are late duplicates; nothing to resolve.
            let Some(task) = state.take_in_flight(task_id) else {
                return (state, effects);
            };
            if !state.accepts_results() {
                state.discard(&task);
            } else {
                match result {
                    Ok(page) => state.accept_page(task, page, &mut effects),
                    Err(error) => state.handle_failure(task, error, &mut effects),
                }
            }
        }
        Msg::RetryDue { task_id } => {
            if state.phase() == RunPhase::Running {
                state.retry_due(task_id);
            }
        }
        Msg::AbortRequested { mode } => {
            state.abort(AbortCause::Cancelled { mode }, mode, &mut effects);
        }
    }

    state.pump(&mut effects);
    (state, effects)
}
