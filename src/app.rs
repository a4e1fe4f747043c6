use std::fmt;
use std::time::Instant;

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::config::RunConfig;
use crate::domain::{AttemptOutcome, Category};
use crate::error::ArchiveError;
use crate::export::{ExportItems, ExportLoader};
use crate::failures::FailureSink;
use crate::fetch::{AuthContext, Fetcher};
use crate::layout::OutputLayout;
use crate::retry::{RetryController, RetryPolicy};
use crate::scheduler::{BatchReport, BatchScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    LoadingExport,
    ProcessingDeleted,
    ProcessingActive,
    PersistingFailures,
    Done,
    FatalError,
}

impl RunPhase {
    fn processing(category: Category) -> Self {
        match category {
            Category::Deleted => RunPhase::ProcessingDeleted,
            Category::Active => RunPhase::ProcessingActive,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Init => "init",
            RunPhase::LoadingExport => "loading-export",
            RunPhase::ProcessingDeleted => "processing-deleted",
            RunPhase::ProcessingActive => "processing-active",
            RunPhase::PersistingFailures => "persisting-failures",
            RunPhase::Done => "done",
            RunPhase::FatalError => "fatal-error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Phase(RunPhase),
    ExportLoaded {
        deleted: usize,
        active: usize,
    },
    BatchStarted {
        category: Category,
        total: usize,
    },
    ItemFinished {
        category: Category,
        timestamp: String,
        outcome: AttemptOutcome,
        done: usize,
        total: usize,
    },
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub deleted: BatchReport,
    pub active: BatchReport,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failure_log: Option<Utf8PathBuf>,
    pub output_root: Utf8PathBuf,
    pub finished_at: String,
    pub elapsed_ms: u128,
}

impl RunSummary {
    pub fn category(&self, category: Category) -> &BatchReport {
        match category {
            Category::Deleted => &self.deleted,
            Category::Active => &self.active,
        }
    }
}

pub struct App<F: Fetcher> {
    config: RunConfig,
    layout: OutputLayout,
    fetcher: F,
}

impl<F: Fetcher> App<F> {
    pub fn new(config: RunConfig, fetcher: F) -> Self {
        let layout = OutputLayout::from_config(&config);
        Self {
            config,
            layout,
            fetcher,
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn run(&self, sink: &dyn ProgressSink) -> Result<RunSummary, ArchiveError> {
        let started = Instant::now();

        enter(sink, RunPhase::Init);
        let auth = self.preconditions().map_err(|err| fatal(sink, err))?;
        self.layout.ensure_dirs().map_err(|err| fatal(sink, err))?;

        enter(sink, RunPhase::LoadingExport);
        let export = ExportLoader::load(&self.config.export_path).map_err(|err| fatal(sink, err))?;
        tracing::info!(
            deleted = export.deleted.len(),
            active = export.active.len(),
            export = %self.config.export_path,
            "export loaded"
        );
        sink.event(ProgressEvent::ExportLoaded {
            deleted: export.deleted.len(),
            active: export.active.len(),
        });

        let failures = FailureSink::new();
        let (deleted, active) = self.process(&export, &auth, &failures, sink);

        enter(sink, RunPhase::PersistingFailures);
        let failure_log = failures.persist(self.layout.failure_log_path())?;

        let summary = RunSummary {
            successful: deleted.successful + active.successful,
            failed: deleted.failed + active.failed,
            skipped: deleted.skipped + active.skipped,
            deleted,
            active,
            failure_log,
            output_root: self.layout.root().to_path_buf(),
            finished_at: iso_timestamp(),
            elapsed_ms: started.elapsed().as_millis(),
        };
        tracing::info!(
            successful = summary.successful,
            failed = summary.failed,
            skipped = summary.skipped,
            "run complete"
        );
        enter(sink, RunPhase::Done);
        Ok(summary)
    }

    fn preconditions(&self) -> Result<AuthContext, ArchiveError> {
        check_inputs(&self.config)?;
        AuthContext::load(&self.config.cookie_path)
    }

    fn process(
        &self,
        export: &ExportItems,
        auth: &AuthContext,
        failures: &FailureSink,
        sink: &dyn ProgressSink,
    ) -> (BatchReport, BatchReport) {
        let controller =
            RetryController::new(&self.fetcher, auth, RetryPolicy::from_config(&self.config));
        let scheduler = BatchScheduler::new(controller, &self.layout, self.config.workers);

        let mut deleted = BatchReport::default();
        let mut active = BatchReport::default();
        for category in Category::ALL {
            enter(sink, RunPhase::processing(category));
            let report = scheduler.run_batch(export.for_category(category), category, sink);
            failures.extend(report.failures.iter().cloned());
            match category {
                Category::Deleted => deleted = report,
                Category::Active => active = report,
            }
        }
        (deleted, active)
    }
}

/// Cookie file first, then export. Runs before anything else is set up.
pub fn check_inputs(config: &RunConfig) -> Result<(), ArchiveError> {
    if !config.cookie_path.as_std_path().exists() {
        return Err(ArchiveError::MissingAuthContext(config.cookie_path.clone()));
    }
    if !config.export_path.as_std_path().exists() {
        return Err(ArchiveError::MissingExport(config.export_path.clone()));
    }
    Ok(())
}

fn enter(sink: &dyn ProgressSink, phase: RunPhase) {
    tracing::debug!(%phase, "entering phase");
    sink.event(ProgressEvent::Phase(phase));
}

fn fatal(sink: &dyn ProgressSink, err: ArchiveError) -> ArchiveError {
    tracing::error!(error = %err, "run aborted");
    sink.event(ProgressEvent::Phase(RunPhase::FatalError));
    err
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
