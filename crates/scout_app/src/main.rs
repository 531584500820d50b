mod cli;
mod config;
mod summary;

use std::fs::File;
use std::io::BufWriter;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use engine_logging::{engine_info, engine_warn, LogDestination};
use scout_core::{CancelMode, CompletionReport, RunOutcome};
use scout_engine::{
    AbortHandle, ConsoleSink, CrawlError, CrawlOrchestrator, HttpFetchPort, JsonLinesSink,
    ListingSelectors, OutputSink, SelectorListingParser,
};

use crate::cli::Cli;
use crate::config::RunFile;

/// Exit status after an interrupted run, as shells report for SIGINT.
const EXIT_INTERRUPTED: u8 = 130;
const EXIT_FATAL: u8 = 2;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let destination = match &cli.log_file {
        Some(path) => LogDestination::Both(path.clone()),
        None => LogDestination::Terminal,
    };
    engine_logging::initialize(destination, cli.log_level());

    let mut run_file = match &cli.config {
        Some(path) => RunFile::load(path)?,
        None => RunFile::default(),
    };
    cli.apply(&mut run_file);

    let queries = run_file.query_specs()?;
    let config = run_file.crawl_config();
    let parser = SelectorListingParser::new(&ListingSelectors::from(&run_file.selectors))?;
    let port = HttpFetchPort::new(run_file.port_settings()?, parser)?;
    let sink: Arc<dyn OutputSink> = match &cli.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create output file {path:?}"))?;
            Arc::new(JsonLinesSink::new(BufWriter::new(file)))
        }
        None => Arc::new(ConsoleSink),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let orchestrator = CrawlOrchestrator::new(Arc::new(port), sink, config);
    let abort = orchestrator.abort_handle();
    let started = Local::now();
    let result = runtime.block_on(async move {
        tokio::spawn(watch_interrupts(abort));
        orchestrator.start(queries).await
    });
    let finished = Local::now();

    match result {
        Ok(report) => {
            println!("{}", summary::render(&report, started, finished));
            Ok(exit_code(&report))
        }
        Err(CrawlError::Fatal { report, .. }) => {
            println!("{}", summary::render(&report, started, finished));
            Ok(ExitCode::from(EXIT_FATAL))
        }
        Err(err) => Err(err.into()),
    }
}

/// First Ctrl-C stops new fetches; a second one cancels those in flight.
async fn watch_interrupts(abort: AbortHandle) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    engine_warn!("interrupt received, finishing in-flight fetches (Ctrl-C again to stop now)");
    abort.abort(CancelMode::Graceful);
    if tokio::signal::ctrl_c().await.is_ok() {
        engine_info!("second interrupt, cancelling in-flight fetches");
        abort.abort(CancelMode::Immediate);
    }
}

fn exit_code(report: &CompletionReport) -> ExitCode {
    match report.outcome {
        RunOutcome::Completed => ExitCode::SUCCESS,
        RunOutcome::Aborted(_) => ExitCode::from(EXIT_INTERRUPTED),
    }
}
