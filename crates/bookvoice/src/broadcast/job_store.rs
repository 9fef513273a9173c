//! In-memory job registry.
//!
//! Each job lives behind its own mutex, so the task driving a job never
//! contends with other jobs; the outer map lock is held only to insert,
//! look up or remove an entry. Nothing is persisted: a restart loses every
//! job.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::broadcast::job_progress::{
    JobProgressBroadcaster, JobProgressEvent, JobStage, JobStatus,
};
use crate::error::RegistryError;

/// Progress reported for a failed job.
pub const FAILED_PROGRESS: i32 = -1;

/// Progress reported for a completed job.
pub const COMPLETED_PROGRESS: i32 = 100;

/// Highest progress a job may report while still processing.
const MAX_PROCESSING_PROGRESS: i32 = 99;

/// A job's status record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredJob {
    pub id: String,
    pub stage: JobStage,
    /// 0..=100, or -1 once failed.
    pub progress: i32,
    pub message: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Output files by role (`audio`, `text`, `metadata`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files_created: BTreeMap<String, String>,
    /// Failure message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StoredJob {
    fn new(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            stage: JobStage::Starting,
            progress: 0,
            message: "Starting".to_string(),
            status: JobStatus::Processing,
            filename: None,
            title: None,
            files_created: BTreeMap::new(),
            error: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merges `update` into this record, enforcing the progress rules:
    /// progress never decreases while processing, never reaches 100 before
    /// completion, and a terminal record is frozen.
    ///
    /// Returns `false` when the update was rejected.
    fn apply(&mut self, update: JobUpdate) -> bool {
        if self.is_finished() {
            log::warn!(
                "Ignoring update to finished job {} ({:?})",
                self.id,
                self.status
            );
            return false;
        }

        let JobUpdate {
            stage,
            progress,
            message,
            status,
            filename,
            title,
            files_created,
            error,
        } = update;

        if let Some(filename) = filename {
            self.filename = Some(filename);
        }
        if let Some(title) = title {
            self.title = Some(title);
        }
        self.files_created.extend(files_created);
        if let Some(message) = message {
            self.message = message;
        }
        if let Some(stage) = stage {
            self.stage = stage;
        }

        let status = status.or(match stage {
            Some(JobStage::Completed) => Some(JobStatus::Completed),
            Some(JobStage::Failed) => Some(JobStatus::Failed),
            _ => None,
        });

        match status {
            Some(JobStatus::Completed) => {
                self.status = JobStatus::Completed;
                self.stage = JobStage::Completed;
                self.progress = COMPLETED_PROGRESS;
                self.completed_at = Some(Utc::now());
            }
            Some(JobStatus::Failed) => {
                self.status = JobStatus::Failed;
                self.stage = JobStage::Failed;
                self.progress = FAILED_PROGRESS;
                self.error = error.or_else(|| Some(self.message.clone()));
                self.completed_at = Some(Utc::now());
            }
            Some(JobStatus::Processing) | None => {
                if let Some(progress) = progress {
                    let bounded = progress.clamp(0, MAX_PROCESSING_PROGRESS);
                    if bounded < self.progress {
                        log::debug!(
                            "Job {}: keeping progress at {} (got {})",
                            self.id,
                            self.progress,
                            progress
                        );
                    } else {
                        self.progress = bounded;
                    }
                }
            }
        }

        self.updated_at = Utc::now();
        true
    }

    fn to_event(&self) -> JobProgressEvent {
        JobProgressEvent {
            job_id: self.id.clone(),
            stage: self.stage,
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            timestamp: self.updated_at,
            error: self.error.clone(),
        }
    }
}

/// Partial update merged into a [`StoredJob`]; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub stage: Option<JobStage>,
    pub progress: Option<i32>,
    pub message: Option<String>,
    pub status: Option<JobStatus>,
    pub filename: Option<String>,
    pub title: Option<String>,
    pub files_created: BTreeMap<String, String>,
    pub error: Option<String>,
}

impl JobUpdate {
    /// Stage transition with progress and message.
    pub fn stage(stage: JobStage, progress: i32, message: impl Into<String>) -> Self {
        Self {
            stage: Some(stage),
            progress: Some(progress),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            status: Some(JobStatus::Failed),
            message: Some(error.clone()),
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_file(mut self, role: impl Into<String>, path: impl Into<String>) -> Self {
        self.files_created.insert(role.into(), path.into());
        self
    }
}

type JobEntry = Arc<Mutex<StoredJob>>;

/// Keyed store of job status records.
///
/// Uses `std::sync` locks: critical sections never await.
pub struct JobStore {
    jobs: RwLock<HashMap<String, JobEntry>>,
    broadcaster: JobProgressBroadcaster,
}

impl JobStore {
    pub fn new() -> Self {
        Self::with_broadcaster(JobProgressBroadcaster::default())
    }

    /// Creates a store that publishes every write on `broadcaster`.
    pub fn with_broadcaster(broadcaster: JobProgressBroadcaster) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            broadcaster,
        }
    }

    pub fn broadcaster(&self) -> &JobProgressBroadcaster {
        &self.broadcaster
    }

    fn read_jobs(&self) -> RwLockReadGuard<'_, HashMap<String, JobEntry>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, HashMap<String, JobEntry>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn lock_entry(entry: &JobEntry) -> MutexGuard<'_, StoredJob> {
        match entry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job entry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn entry(&self, job_id: &str) -> Result<JobEntry, RegistryError> {
        self.read_jobs()
            .get(job_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))
    }

    /// Inserts a fresh record for `job_id` with `fields` merged in.
    pub fn create(&self, job_id: &str, fields: JobUpdate) -> StoredJob {
        let mut job = StoredJob::new(job_id);
        job.apply(fields);
        let snapshot = job.clone();

        let previous = self
            .write_jobs()
            .insert(job_id.to_string(), Arc::new(Mutex::new(job)));
        if previous.is_some() {
            log::warn!("Job {} was created twice; replaced the old record", job_id);
        }

        self.broadcaster.send(snapshot.to_event());
        snapshot
    }

    /// Merges `update` into the job's record and returns the new snapshot.
    ///
    /// Updates to a finished job are ignored; the unchanged record is
    /// returned.
    pub fn update(&self, job_id: &str, update: JobUpdate) -> Result<StoredJob, RegistryError> {
        let entry = self.entry(job_id)?;
        let mut job = Self::lock_entry(&entry);
        if job.apply(update) {
            self.broadcaster.send(job.to_event());
        }
        Ok(job.clone())
    }

    pub fn query(&self, job_id: &str) -> Result<StoredJob, RegistryError> {
        let entry = self.entry(job_id)?;
        let job = Self::lock_entry(&entry);
        Ok(job.clone())
    }

    /// Removes the job's record and returns it.
    pub fn clear(&self, job_id: &str) -> Result<StoredJob, RegistryError> {
        let entry = self
            .write_jobs()
            .remove(job_id)
            .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))?;
        let job = Self::lock_entry(&entry);
        Ok(job.clone())
    }

    /// All jobs, most recently started first.
    pub fn list(&self) -> Vec<StoredJob> {
        let entries: Vec<JobEntry> = self.read_jobs().values().cloned().collect();
        let mut jobs: Vec<StoredJob> = entries
            .iter()
            .map(|entry| Self::lock_entry(entry).clone())
            .collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs
    }

    /// Removes finished jobs that completed more than `older_than` ago.
    ///
    /// Returns the number of records removed.
    pub fn prune_finished(&self, older_than: Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let mut jobs = self.write_jobs();
        let before = jobs.len();
        jobs.retain(|_, entry| {
            let job = Self::lock_entry(entry);
            !(job.is_finished() && job.completed_at.is_some_and(|done| done <= cutoff))
        });
        let removed = before - jobs.len();
        if removed > 0 {
            log::info!("Pruned {} finished jobs", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read_jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_jobs().is_empty()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_query() {
        let store = JobStore::new();
        let created = store.create(
            "job-1",
            JobUpdate::default()
                .with_filename("alice.txt")
                .with_title("Alice"),
        );
        assert_eq!(created.stage, JobStage::Starting);
        assert_eq!(created.progress, 0);

        let job = store.query("job-1").unwrap();
        assert_eq!(job.filename.as_deref(), Some("alice.txt"));
        assert_eq!(job.title.as_deref(), Some("Alice"));
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn test_query_unknown_is_not_found() {
        let store = JobStore::new();
        assert_eq!(
            store.query("missing"),
            Err(RegistryError::NotFound("missing".to_string()))
        );
    }

    #[test]
    fn test_cleared_and_never_submitted_are_both_not_found() {
        let store = JobStore::new();
        store.create("job-1", JobUpdate::default());
        store.clear("job-1").unwrap();

        assert!(matches!(store.query("job-1"), Err(RegistryError::NotFound(_))));
        assert!(matches!(store.query("job-2"), Err(RegistryError::NotFound(_))));
        assert!(store.clear("job-1").is_err());
    }

    #[test]
    fn test_update_merges_partial_fields() {
        let store = JobStore::new();
        store.create("job", JobUpdate::default().with_title("Alice"));

        store
            .update(
                "job",
                JobUpdate::stage(JobStage::ExtractingText, 10, "Extracting text")
                    .with_file("source", "/books/Alice/alice.pdf"),
            )
            .unwrap();
        let job = store
            .update("job", JobUpdate::default().with_file("text", "/books/Alice/pdf_result.md"))
            .unwrap();

        assert_eq!(job.stage, JobStage::ExtractingText);
        assert_eq!(job.message, "Extracting text");
        assert_eq!(job.title.as_deref(), Some("Alice"));
        assert_eq!(job.files_created.len(), 2);
    }

    #[test]
    fn test_progress_never_decreases_while_processing() {
        let store = JobStore::new();
        store.create("job", JobUpdate::default());
        store
            .update("job", JobUpdate::stage(JobStage::AdjustingSpeed, 62, "Adjusting"))
            .unwrap();
        let job = store
            .update("job", JobUpdate::stage(JobStage::Transcribing, 60, "Transcribing"))
            .unwrap();
        assert_eq!(job.stage, JobStage::Transcribing);
        assert_eq!(job.progress, 62);
    }

    #[test]
    fn test_processing_never_reports_100() {
        let store = JobStore::new();
        store.create("job", JobUpdate::default());
        let job = store
            .update("job", JobUpdate::stage(JobStage::Finalizing, 100, "Finalizing"))
            .unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.progress < 100);
    }

    #[test]
    fn test_terminal_states() {
        let store = JobStore::new();
        store.create("ok", JobUpdate::default());
        let done = store.update("ok", JobUpdate::completed("Done")).unwrap();
        assert_eq!((done.status, done.progress), (JobStatus::Completed, 100));
        assert_eq!(done.stage, JobStage::Completed);
        assert!(done.completed_at.is_some());

        store.create("bad", JobUpdate::default());
        let failed = store.update("bad", JobUpdate::failed("boom")).unwrap();
        assert_eq!((failed.status, failed.progress), (JobStatus::Failed, -1));
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_finished_job_is_frozen() {
        let store = JobStore::new();
        store.create("job", JobUpdate::default());
        store.update("job", JobUpdate::failed("boom")).unwrap();

        let after = store
            .update("job", JobUpdate::stage(JobStage::Transcribing, 60, "late"))
            .unwrap();
        assert_eq!(after.status, JobStatus::Failed);
        assert_eq!(after.progress, -1);
        assert_eq!(after.message, "boom");
    }

    #[test]
    fn test_writes_are_broadcast() {
        let store = JobStore::new();
        let mut rx = store.broadcaster().subscribe();

        store.create("job", JobUpdate::default());
        store
            .update("job", JobUpdate::stage(JobStage::SavingFile, 5, "Saving"))
            .unwrap();

        assert_eq!(rx.try_recv().unwrap().stage, JobStage::Starting);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.stage, JobStage::SavingFile);
        assert_eq!(event.progress, 5);
    }

    #[test]
    fn test_prune_finished() {
        let store = JobStore::new();
        store.create("running", JobUpdate::default());
        store.create("done", JobUpdate::default());
        store.update("done", JobUpdate::completed("Done")).unwrap();

        assert_eq!(store.prune_finished(Duration::hours(1)), 0);
        assert_eq!(store.prune_finished(Duration::zero()), 1);
        assert!(store.query("running").is_ok());
        assert!(store.query("done").is_err());
    }

    #[test]
    fn test_list_and_len() {
        let store = JobStore::new();
        store.create("a", JobUpdate::default());
        store.create("b", JobUpdate::default());
        store.update("b", JobUpdate::failed("x")).unwrap();

        let statuses: Vec<JobStatus> = store.list().iter().map(|j| j.status).collect();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.contains(&JobStatus::Processing));
        assert!(statuses.contains(&JobStatus::Failed));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_concurrent_writers_on_distinct_jobs() {
        let store = Arc::new(JobStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let id = format!("job-{}", i);
                    store.create(&id, JobUpdate::default());
                    for p in 0..=90 {
                        store
                            .update(&id, JobUpdate::stage(JobStage::GeneratingAudio, p, "gen"))
                            .unwrap();
                    }
                    store.update(&id, JobUpdate::completed("Done")).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let jobs = store.list();
        assert_eq!(jobs.len(), 8);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Completed && j.progress == 100));
    }
}
