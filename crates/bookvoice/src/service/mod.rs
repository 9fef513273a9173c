//! Host-facing operations.
//!
//! [`AudiobookService`] is what an application shell calls: it validates
//! submissions, starts one pipeline task per book, answers status queries
//! from the registry and manages the voice sample store.

pub mod poller;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::broadcast::{JobProgressEvent, JobStore, JobUpdate, StoredJob};
use crate::config::{self, Settings};
use crate::error::{ConfigError, RegistryError, SampleError, StorageError, ValidationError};
use crate::pipeline::{Pipeline, PipelineConfig, PipelineContext, PipelineError, RegistryProgress};
use crate::process::{ProcessRunner, SystemProcessRunner};
use crate::storage::{self, BookMetadata};
use crate::voice::{self, VoiceSample};
use crate::worker::job::{BookSubmission, JobResult};

pub use poller::StatusPoller;

/// Upper bound for the finished-job retention setting (about 292 years).
const MAX_TTL_SECS: i64 = i64::MAX / 1000;

/// Uniform response wrapper for UI hosts.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for ApiResponse<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

/// Handle to a submitted job.
///
/// Dropping it detaches the job; it keeps running and stays queryable.
pub struct JobTicket {
    pub job_id: String,
    handle: JoinHandle<JobResult>,
}

impl JobTicket {
    /// Waits for the pipeline task to finish.
    pub async fn wait(self) -> Result<JobResult, PipelineError> {
        self.handle
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))
    }
}

struct ServiceState {
    settings: Settings,
    settings_path: Option<PathBuf>,
    pipeline: Arc<Pipeline>,
}

pub struct AudiobookService {
    store: Arc<JobStore>,
    runner: Arc<dyn ProcessRunner>,
    state: RwLock<ServiceState>,
}

impl AudiobookService {
    pub fn new(settings: Settings, runner: Arc<dyn ProcessRunner>) -> Self {
        let pipeline = Self::build_pipeline(&settings, &runner);
        Self {
            store: Arc::new(JobStore::new()),
            runner,
            state: RwLock::new(ServiceState {
                settings,
                settings_path: None,
                pipeline,
            }),
        }
    }

    /// Loads settings from `path` (defaults when absent) and persists later
    /// changes back to it. Stage executables run as real processes.
    pub fn from_settings_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let settings = config::load_settings(path)?;
        Ok(Self::new(settings, Arc::new(SystemProcessRunner::new())).with_settings_path(path))
    }

    pub fn with_settings_path(self, path: impl Into<PathBuf>) -> Self {
        self.write_state().settings_path = Some(path.into());
        self
    }

    fn build_pipeline(settings: &Settings, runner: &Arc<dyn ProcessRunner>) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            Arc::new(PipelineConfig::from_settings(settings)),
            Arc::clone(runner),
        ))
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ServiceState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Service state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ServiceState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Service state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn settings(&self) -> Settings {
        self.read_state().settings.clone()
    }

    /// Validates `submission` and starts its pipeline in the background.
    ///
    /// Invalid submissions are rejected here and never become jobs.
    pub async fn submit(&self, submission: BookSubmission) -> Result<JobTicket, ValidationError> {
        let kind = submission.validate()?;
        let filename = submission.file_name()?;
        self.prune_expired();

        let job_id = uuid::Uuid::new_v4().to_string();
        self.store.create(
            &job_id,
            JobUpdate::default()
                .with_filename(filename.clone())
                .with_title(submission.title.trim()),
        );
        info!(
            job_id = %job_id,
            filename = %filename,
            mime_type = submission.mime_type().as_deref().unwrap_or("unknown"),
            "Submitted book"
        );

        let pipeline = Arc::clone(&self.read_state().pipeline);
        let progress = RegistryProgress::new(Arc::clone(&self.store), &job_id);
        let ctx = PipelineContext::new(&job_id, submission, kind);
        let handle = tokio::spawn(async move {
            let (result, _ctx) = pipeline.run(ctx, &progress).await;
            result
        });

        Ok(JobTicket { job_id, handle })
    }

    pub fn query(&self, job_id: &str) -> Result<StoredJob, RegistryError> {
        self.store.query(job_id)
    }

    /// Removes a job's record. A still-running pipeline is not interrupted.
    pub fn clear(&self, job_id: &str) -> Result<StoredJob, RegistryError> {
        let job = self.store.clear(job_id)?;
        info!(job_id, "Cleared job");
        Ok(job)
    }

    pub fn list_jobs(&self) -> Vec<StoredJob> {
        self.store.list()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.store.broadcaster().subscribe()
    }

    pub fn poller(&self, job_id: &str) -> StatusPoller {
        StatusPoller::new(Arc::clone(&self.store), job_id)
    }

    /// Reads a whole file, e.g. a finished audiobook for playback.
    pub async fn read_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<u8>, StorageError> {
        let path = path.as_ref();
        tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })
    }

    pub fn list_books<P: AsRef<Path>>(&self, root: P) -> Vec<BookMetadata> {
        storage::list_books(root.as_ref())
    }

    /// Drops finished jobs past the configured retention, if any.
    pub fn prune_expired(&self) -> usize {
        match self.read_state().settings.finished_job_ttl_secs {
            Some(ttl) => {
                let secs = i64::try_from(ttl).unwrap_or(i64::MAX).min(MAX_TTL_SECS);
                self.store.prune_finished(chrono::Duration::seconds(secs))
            }
            None => 0,
        }
    }

    pub fn voice_samples_dir(&self) -> PathBuf {
        self.read_state().settings.voice_samples_dir.clone()
    }

    /// Moves the voice sample store and persists the setting.
    pub fn set_voice_samples_dir(&self, dir: impl Into<PathBuf>) -> Result<(), ConfigError> {
        let mut state = self.write_state();
        let mut settings = state.settings.clone();
        settings.voice_samples_dir = dir.into();
        config::validate_settings(&settings)?;

        if let Some(path) = &state.settings_path {
            config::save_settings(path, &settings)?;
        }
        state.pipeline = Self::build_pipeline(&settings, &self.runner);
        state.settings = settings;
        Ok(())
    }

    pub fn list_samples(&self) -> Result<Vec<VoiceSample>, SampleError> {
        voice::list(&self.voice_samples_dir())
    }

    pub fn add_sample(
        &self,
        display_name: &str,
        bytes: &[u8],
        extension: &str,
    ) -> Result<VoiceSample, SampleError> {
        voice::add_sample(&self.voice_samples_dir(), display_name, bytes, extension)
    }

    pub fn rename_sample(&self, sample_id: &str, new_name: &str) -> Result<VoiceSample, SampleError> {
        voice::rename_sample(&self.voice_samples_dir(), sample_id, new_name)
    }

    pub fn delete_sample(&self, sample_id: &str) -> Result<(), SampleError> {
        voice::delete_sample(&self.voice_samples_dir(), sample_id)
    }
}
