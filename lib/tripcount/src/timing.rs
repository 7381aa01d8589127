use crate::io::open_writer;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone, Timelike};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Milestone log written next to the result file, one line per event:
/// `dd/MM/yyyy HH:mm:ss:SSSS INFO [thread] source - message`.
pub struct TimingLog {
    path: PathBuf,
    source: String,
    writer: BufWriter<File>,
}

impl TimingLog {
    /// Creates (or truncates) the log at `path`.
    pub fn create(path: impl AsRef<Path>, source: impl Into<String>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = open_writer(&path)?;
        Ok(Self { path, source: source.into(), writer })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn record(&mut self, message: &str) -> Result<()> {
        let line = format_line(&Local::now(), &thread_label(), &self.source, message);
        writeln!(self.writer, "{line}").with_context(|| format!("write {}", self.path.display()))?;
        // flushed per line so the log survives an aborted run
        self.writer.flush().with_context(|| format!("flush {}", self.path.display()))
    }
}

fn thread_label() -> String {
    std::thread::current().name().unwrap_or("unnamed").to_string()
}

pub fn format_line<Tz: TimeZone>(at: &DateTime<Tz>, thread: &str, source: &str, message: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let millis = at.nanosecond() / 1_000_000 % 1000;
    format!(
        "{}:{:04} INFO [{}] {} - {}",
        at.format("%d/%m/%Y %H:%M:%S"),
        millis,
        thread,
        source,
        message
    )
}
