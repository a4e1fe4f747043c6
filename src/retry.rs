use std::thread;
use std::time::Duration;

use camino::Utf8Path;

use crate::config::RunConfig;
use crate::domain::{AttemptOutcome, ItemDescriptor};
use crate::fetch::{AuthContext, FetchRequest, Fetcher};

pub const MISSING_SOURCE: &str = "missing source reference";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
    pub fetch_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.backoff(),
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

pub struct RetryController<'a, F: Fetcher> {
    fetcher: &'a F,
    auth: &'a AuthContext,
    policy: RetryPolicy,
}

impl<'a, F: Fetcher> RetryController<'a, F> {
    pub fn new(fetcher: &'a F, auth: &'a AuthContext, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            auth,
            policy,
        }
    }

    pub fn attempt(&self, item: &ItemDescriptor, destination: &Utf8Path) -> AttemptOutcome {
        if destination.as_std_path().exists() {
            tracing::info!(path = %destination, "already downloaded, skipping");
            return AttemptOutcome::Skipped;
        }

        let url = item.effective_url();
        if url.trim().is_empty() {
            tracing::warn!(timestamp = %item.timestamp, category = %item.category, "no video link in export entry");
            return AttemptOutcome::Failed {
                reason: MISSING_SOURCE.to_string(),
                attempts_made: 0,
            };
        }

        let request = FetchRequest {
            url: &url,
            auth: self.auth,
            destination: destination.as_std_path(),
            timeout: self.policy.fetch_timeout,
        };

        let max = self.policy.max_retries.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.fetcher.fetch(&request) {
                Ok(()) => {
                    tracing::info!(path = %destination, attempt, "downloaded");
                    return AttemptOutcome::Success;
                }
                Err(err) if attempt < max => {
                    tracing::warn!(
                        url = %url,
                        attempt,
                        backoff_secs = self.policy.backoff.as_secs_f64(),
                        error = %err,
                        "attempt failed, retrying"
                    );
                    thread::sleep(self.policy.backoff);
                }
                Err(err) => {
                    tracing::error!(url = %url, attempts = attempt, error = %err, "giving up");
                    return AttemptOutcome::Failed {
                        reason: err.to_string(),
                        attempts_made: attempt,
                    };
                }
            }
        }
    }
}
