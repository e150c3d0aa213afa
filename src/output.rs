use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunSummary};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
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

/// Progress on stderr, summary on stdout.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        Self::write_summary(&mut stdout, summary)
    }

    pub fn write_summary<W: Write>(out: &mut W, summary: &RunSummary) -> io::Result<()> {
        if summary.dry_run {
            writeln!(out, "Dry run, ledger left untouched: {}", summary.ledger_path)?;
        } else {
            writeln!(out, "Data processing complete: {}", summary.ledger_path)?;
        }
        writeln!(out, "Total data count: {}", summary.total_records)?;
        writeln!(out, "New data count: {}", summary.new_records)?;
        if summary.rejected_records > 0 {
            writeln!(
                out,
                "Rejected (unrecognized date): {}",
                summary.rejected_records
            )?;
        } else if summary.unparsed_dates > 0 {
            writeln!(
                out,
                "Kept with unrecognized date: {}",
                summary.unparsed_dates
            )?;
        }
        Ok(())
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let mut stderr = io::stderr().lock();
        let _ = match event.elapsed {
            Some(elapsed) => writeln!(stderr, "{} ({} ms)", event.message, elapsed.as_millis()),
            None => writeln!(stderr, "{}", event.message),
        };
    }
}
