use std::io::{self, IsTerminal, Write};

use crossterm::QueueableCommand;
use crossterm::cursor::MoveToColumn;
use crossterm::terminal::{Clear, ClearType};
use serde::Serialize;
use tracing::debug;

use crate::batch::{BatchItem, BatchReport};
use crate::progress::{Position, ProgressEvent, ProgressSink};
use crate::store::{GroupPending, GroupStatus};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

/// Human progress on stdout: one line per resource and an in-place byte counter.
pub struct ConsoleProgress {
    overwrite: bool,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            overwrite: io::stdout().is_terminal(),
        }
    }

    pub fn print_position(&self, position: Position, item: &BatchItem) {
        let detail = match &item.error {
            Some(error) => format!("{} ({error})", item.action),
            None => item.action.clone(),
        };
        println!(
            "[{}/{}] {} {}",
            position.current, position.total, detail, item.url
        );
    }

    fn write_bytes_line(&self, received: u64, expected: Option<u64>) -> io::Result<()> {
        if !self.overwrite {
            return Ok(());
        }
        let mut stdout = io::stdout();
        stdout.queue(MoveToColumn(0))?;
        stdout.queue(Clear(ClearType::CurrentLine))?;
        match expected {
            Some(expected) => write!(
                stdout,
                "{}/{}",
                format_megabytes(received),
                format_megabytes(expected)
            )?,
            None => write!(stdout, "{}", format_megabytes(received))?,
        }
        stdout.flush()
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Downloading { url, expected } => {
                println!("Downloading file: {url}, Size: {}", describe_size(expected));
            }
            ProgressEvent::Resuming {
                url,
                offset,
                expected,
            } => {
                println!(
                    "Resuming file download: {url}, Size: {}/{}",
                    format_megabytes(offset),
                    describe_size(expected)
                );
            }
            ProgressEvent::AlreadyDownloaded { url } => {
                println!("File is already downloaded: {url}");
            }
            ProgressEvent::Bytes { received, expected } => {
                if let Err(err) = self.write_bytes_line(received, expected) {
                    debug!(error = %err, "failed to update progress line");
                }
            }
            ProgressEvent::Completed { .. } => {
                if self.overwrite {
                    println!();
                }
            }
        }
    }
}

pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2}MB", bytes as f64 / 1024.0 / 1024.0)
}

fn describe_size(expected: Option<u64>) -> String {
    expected
        .map(format_megabytes)
        .unwrap_or_else(|| "unknown".to_string())
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &BatchReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_status(status: &[GroupStatus]) -> io::Result<()> {
        Self::print_json(&status)
    }

    pub fn print_pending(pending: &[GroupPending]) -> io::Result<()> {
        Self::print_json(&pending)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}
