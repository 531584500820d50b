use std::io::{self, Write};
use std::sync::Mutex;

use scout_core::ListingRecord;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("sink writer poisoned")]
    Poisoned,
}

/// Receives each listing once, in arrival order.
pub trait OutputSink: Send + Sync {
    fn emit(&self, record: &ListingRecord) -> Result<(), SinkError>;
}

/// Prints a human readable block per listing to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn render(record: &ListingRecord) -> String {
        format!(
            "\nTitle: {}\nCompany: {}\nLocation: {}\nDescription: {}\nLink: {}",
            record.title,
            record.company,
            record.location,
            record.description_snippet,
            record.link
        )
    }
}

impl OutputSink for ConsoleSink {
    fn emit(&self, record: &ListingRecord) -> Result<(), SinkError> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", Self::render(record))?;
        Ok(())
    }
}

#[derive(Serialize)]
struct ListingLine<'a> {
    identity: &'a str,
    title: &'a str,
    company: &'a str,
    location: &'a str,
    description_snippet: &'a str,
    link: &'a str,
}

impl<'a> From<&'a ListingRecord> for ListingLine<'a> {
    fn from(record: &'a ListingRecord) -> Self {
        Self {
            identity: &record.identity,
            title: &record.title,
            company: &record.company,
            location: &record.location,
            description_snippet: &record.description_snippet,
            link: &record.link,
        }
    }
}

/// Writes one JSON object per line and flushes after each record.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> OutputSink for JsonLinesSink<W> {
    fn emit(&self, record: &ListingRecord) -> Result<(), SinkError> {
        let line = serde_json::to_string(&ListingLine::from(record))?;
        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
