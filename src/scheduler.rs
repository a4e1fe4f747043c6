use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Mutex, PoisonError};
use std::thread;

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{AttemptOutcome, Category, FailureRecord, ItemDescriptor};
use crate::fetch::Fetcher;
use crate::layout::OutputLayout;
use crate::retry::RetryController;

pub const DEFAULT_WORKERS: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub successful: usize,
    pub failed: usize,
    /// Already on disk; included in `successful`.
    pub skipped: usize,
    #[serde(skip)]
    pub failures: Vec<FailureRecord>,
}

impl BatchReport {
    fn absorb(&mut self, item: &ItemDescriptor, outcome: &AttemptOutcome) {
        match outcome {
            AttemptOutcome::Success => self.successful += 1,
            AttemptOutcome::Skipped => {
                self.successful += 1;
                self.skipped += 1;
            }
            AttemptOutcome::Failed {
                reason,
                attempts_made,
            } => {
                self.failed += 1;
                self.failures
                    .push(FailureRecord::new(item, reason.clone(), *attempts_made));
            }
        }
    }
}

/// Fixed-width worker pool running one category at a time.
pub struct BatchScheduler<'a, F: Fetcher> {
    controller: RetryController<'a, F>,
    layout: &'a OutputLayout,
    workers: usize,
}

impl<'a, F: Fetcher> BatchScheduler<'a, F> {
    pub fn new(controller: RetryController<'a, F>, layout: &'a OutputLayout, workers: usize) -> Self {
        Self {
            controller,
            layout,
            workers: workers.max(1),
        }
    }

    pub fn run_batch(
        &self,
        items: &[ItemDescriptor],
        category: Category,
        sink: &dyn ProgressSink,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        if items.is_empty() {
            return report;
        }

        let total = items.len();
        let width = self.workers.min(total);
        tracing::info!(%category, items = total, workers = width, "starting batch");
        sink.event(ProgressEvent::BatchStarted { category, total });

        let queue = Mutex::new(items.iter().enumerate());
        let (tx, rx) = mpsc::channel::<(usize, AttemptOutcome)>();

        thread::scope(|scope| {
            for _ in 0..width {
                let tx = tx.clone();
                let queue = &queue;
                scope.spawn(move || {
                    loop {
                        let next = queue
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .next();
                        let Some((index, item)) = next else {
                            break;
                        };
                        let outcome = self.run_task(item);
                        if tx.send((index, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for (done, (index, outcome)) in rx.into_iter().enumerate() {
                let item = &items[index];
                report.absorb(item, &outcome);
                sink.event(ProgressEvent::ItemFinished {
                    category,
                    timestamp: item.timestamp.clone(),
                    outcome,
                    done: done + 1,
                    total,
                });
            }
        });

        tracing::info!(
            %category,
            successful = report.successful,
            skipped = report.skipped,
            failed = report.failed,
            "batch finished"
        );
        report
    }

    fn run_task(&self, item: &ItemDescriptor) -> AttemptOutcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.controller.attempt(item, &self.layout.resolve(item))
        }));
        result.unwrap_or_else(|payload| {
            let reason = format!("download task panicked: {}", panic_message(payload.as_ref()));
            tracing::error!(timestamp = %item.timestamp, %reason, "task aborted");
            AttemptOutcome::Failed {
                reason,
                attempts_made: 0,
            }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}
