use std::sync::Arc;
use std::time::Duration;

use crate::broadcast::{JobStore, StoredJob};
use crate::error::RegistryError;

/// Consecutive NotFound answers tolerated for a job believed in flight.
pub const DEFAULT_NOT_FOUND_TOLERANCE: u32 = 3;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Polls one job's status the way a UI does.
///
/// A NotFound for a job that should exist is treated as transient up to a
/// bounded number of consecutive answers, then surfaced.
pub struct StatusPoller {
    store: Arc<JobStore>,
    job_id: String,
    max_not_found: u32,
    interval: Duration,
    misses: u32,
}

impl StatusPoller {
    pub fn new(store: Arc<JobStore>, job_id: &str) -> Self {
        Self {
            store,
            job_id: job_id.to_string(),
            max_not_found: DEFAULT_NOT_FOUND_TOLERANCE,
            interval: DEFAULT_POLL_INTERVAL,
            misses: 0,
        }
    }

    pub fn with_tolerance(mut self, max_not_found: u32) -> Self {
        self.max_not_found = max_not_found;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Queries once. `Ok(None)` is a tolerated NotFound.
    pub fn poll(&mut self) -> Result<Option<StoredJob>, RegistryError> {
        match self.store.query(&self.job_id) {
            Ok(job) => {
                self.misses = 0;
                Ok(Some(job))
            }
            Err(e) => {
                self.misses += 1;
                if self.misses > self.max_not_found {
                    Err(e)
                } else {
                    log::debug!(
                        "Job {} not found ({}/{}), retrying",
                        self.job_id,
                        self.misses,
                        self.max_not_found
                    );
                    Ok(None)
                }
            }
        }
    }

    /// Polls until the job reaches a terminal state.
    pub async fn wait_for_terminal(&mut self) -> Result<StoredJob, RegistryError> {
        loop {
            if let Some(job) = self.poll()? {
                if job.is_finished() {
                    return Ok(job);
                }
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
