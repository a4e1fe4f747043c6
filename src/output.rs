use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunPhase, RunSummary};
use crate::domain::{AttemptOutcome, Category};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
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

/// Line-oriented progress for a terminal.
pub struct TextOutput;

impl TextOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout)?;
        writeln!(stdout, "Download complete!")?;
        for category in Category::ALL {
            let report = summary.category(category);
            writeln!(
                stdout,
                "  {category}: {} ok ({} already present), {} failed",
                report.successful, report.skipped, report.failed
            )?;
        }
        writeln!(stdout, "Total successfully downloaded: {} videos", summary.successful)?;
        writeln!(stdout, "Total failed downloads: {} videos", summary.failed)?;
        if let Some(path) = &summary.failure_log {
            writeln!(stdout, "Check {path} for details about failed downloads")?;
        }
        Ok(())
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Phase(RunPhase::LoadingExport) => println!("Reading export file..."),
            ProgressEvent::Phase(_) => {}
            ProgressEvent::ExportLoaded { deleted, active } => {
                println!("Found {deleted} deleted and {active} active videos");
            }
            ProgressEvent::BatchStarted { category, total } => {
                println!();
                println!("Processing {total} {category} videos...");
            }
            ProgressEvent::ItemFinished {
                timestamp,
                outcome,
                done,
                total,
                ..
            } => {
                let status = match &outcome {
                    AttemptOutcome::Success => "downloaded".to_string(),
                    AttemptOutcome::Skipped => "already exists".to_string(),
                    AttemptOutcome::Failed { reason, .. } => format!("failed: {reason}"),
                };
                println!("[{done}/{total}] {timestamp} {status}");
            }
        }
    }
}
