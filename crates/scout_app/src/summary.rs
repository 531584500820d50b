use std::fmt::Write;

use chrono::{DateTime, Local};
use scout_core::{AbortCause, CompletionReport, RunOutcome};

pub(crate) fn render(
    report: &CompletionReport,
    started: DateTime<Local>,
    finished: DateTime<Local>,
) -> String {
    let mut out = String::new();
    let outcome = match &report.outcome {
        RunOutcome::Completed if report.record_cap_reached => {
            "completed (record cap reached)".to_string()
        }
        RunOutcome::Completed => "completed".to_string(),
        RunOutcome::Aborted(AbortCause::Cancelled { mode }) => format!("cancelled ({mode:?})"),
        RunOutcome::Aborted(AbortCause::Fatal { error, task }) => {
            format!("aborted: {error} on {task}")
        }
    };
    let elapsed = (finished - started).num_milliseconds() as f64 / 1000.0;

    let _ = writeln!(out, "\nRun {outcome}");
    let _ = writeln!(out, "  started:    {}", started.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(
        out,
        "  finished:   {} ({elapsed:.1}s)",
        finished.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out, "  listings:   {}", report.emitted_count);
    let _ = writeln!(out, "  duplicates: {}", report.duplicate_count);
    let _ = writeln!(out, "  discarded:  {}", report.discarded_count);
    let _ = write!(out, "  failures:   {}", report.permanent_failures.len());
    for failure in &report.permanent_failures {
        let _ = write!(out, "\n    {}: {}", failure.task, failure.error);
    }
    out
}
