use std::path::PathBuf;

use clap::{ArgAction, Parser};
use engine_logging::LevelFilter;

use crate::config::{QueryEntry, RunFile};

#[derive(Parser, Debug)]
#[command(
    name = "listing-scout",
    version,
    about = "Crawl paged job listing searches politely and print unique listings"
)]
/// Command-line arguments accepted by the `listing-scout` binary.
pub(crate) struct Cli {
    /// RON run file; command-line options override its values.
    #[arg(short, long = "config", value_name = "FILE", env = "SCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Search keyword. Replaces the queries of the run file.
    #[arg(short, long, value_name = "TEXT")]
    pub keyword: Option<String>,

    /// Extra search parameter, repeatable.
    #[arg(short, long = "filter", value_name = "NAME=VALUE", value_parser = parse_filter)]
    pub filters: Vec<(String, String)>,

    /// Result pages per query.
    #[arg(short, long, value_name = "N")]
    pub pages: Option<u32>,

    #[arg(long, value_name = "N")]
    pub max_concurrent: Option<usize>,

    /// Minimum gap between fetch starts against the same source.
    #[arg(long, value_name = "MS")]
    pub min_delay_ms: Option<u64>,

    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Per-attempt timeout.
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Stop after this many unique listings; 0 removes the cap.
    #[arg(long, value_name = "N")]
    pub max_records: Option<usize>,

    #[arg(long, value_name = "URL")]
    pub search_url: Option<String>,

    /// Cookie header sent with every request.
    #[arg(long, value_name = "COOKIE", env = "SCOUT_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,

    /// Write listings as JSON lines to this file instead of the console.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Also write the log to this file.
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub(crate) fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Applies command-line overrides on top of the run file.
    pub(crate) fn apply(&self, run: &mut RunFile) {
        if let Some(keyword) = &self.keyword {
            run.queries = vec![QueryEntry {
                keyword: keyword.clone(),
                ..QueryEntry::default()
            }];
        }
        for query in &mut run.queries {
            if let Some(pages) = self.pages {
                query.pages = pages;
            }
            for (name, value) in &self.filters {
                query.filters.insert(name.clone(), value.clone());
            }
        }

        if let Some(n) = self.max_concurrent {
            run.max_concurrent = n;
        }
        if let Some(ms) = self.min_delay_ms {
            run.min_delay_ms = ms;
        }
        if let Some(n) = self.max_retries {
            run.max_retries = n;
        }
        if let Some(ms) = self.timeout_ms {
            run.timeout_ms = ms;
        }
        if let Some(n) = self.max_records {
            run.max_records = (n > 0).then_some(n);
        }
        if let Some(url) = &self.search_url {
            run.search_url = url.clone();
        }
        if let Some(cookie) = &self.cookie {
            run.cookie = Some(cookie.clone());
        }
    }
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("filter name is empty in {raw:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
