#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use tiktok_archive::app::{ProgressEvent, ProgressSink};
use tiktok_archive::error::ArchiveError;
use tiktok_archive::fetch::{FetchRequest, Fetcher};

/// Succeeds by writing a small file, except for URLs listed in `failing`.
#[derive(Default)]
pub struct MockFetcher {
    pub calls: Mutex<Vec<String>>,
    pub failing: HashSet<String>,
    pub panicking: HashSet<String>,
    pub delay: Duration,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockFetcher {
    pub fn failing(urls: &[&str]) -> Self {
        Self {
            failing: urls.iter().map(|url| url.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.as_str() == url)
            .count()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<(), ArchiveError> {
        self.calls.lock().unwrap().push(request.url.to_string());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.contains(request.url) {
            panic!("fetcher exploded");
        }
        if self.failing.contains(request.url) {
            return Err(ArchiveError::FetchStatus {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        std::fs::write(request.destination, b"video").unwrap();
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

pub fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

pub fn write(path: &Utf8Path, content: &str) {
    std::fs::write(path.as_std_path(), content).unwrap();
}
