use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::broadcast::job_progress::JobStage;
use crate::broadcast::job_store::{JobStore, JobUpdate};

/// Events emitted by the pipeline during processing.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Stage {
        stage: JobStage,
        progress: i32,
        message: String,
    },
    FileCreated {
        role: String,
        path: String,
    },
    Completed {
        message: String,
    },
    Failed {
        error: String,
    },
}

impl ProgressEvent {
    pub fn stage(stage: JobStage, progress: i32, message: impl Into<String>) -> Self {
        ProgressEvent::Stage {
            stage,
            progress,
            message: message.into(),
        }
    }

    pub fn file(role: &str, path: &Path) -> Self {
        ProgressEvent::FileCreated {
            role: role.to_string(),
            path: path.display().to_string(),
        }
    }
}

/// Receives pipeline events. Reports are synchronous: the pipeline does not
/// advance until the event has been recorded.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Writes pipeline events into the job registry.
pub struct RegistryProgress {
    store: Arc<JobStore>,
    job_id: String,
}

impl RegistryProgress {
    pub fn new(store: Arc<JobStore>, job_id: &str) -> Self {
        Self {
            store,
            job_id: job_id.to_string(),
        }
    }
}

impl ProgressReporter for RegistryProgress {
    fn report(&self, event: ProgressEvent) {
        let update = match event {
            ProgressEvent::Stage {
                stage,
                progress,
                message,
            } => JobUpdate::stage(stage, progress, message),
            ProgressEvent::FileCreated { role, path } => JobUpdate::default().with_file(role, path),
            ProgressEvent::Completed { message } => JobUpdate::completed(message),
            ProgressEvent::Failed { error } => JobUpdate::failed(error),
        };

        // A cleared job keeps running until its process exits; its updates
        // have nowhere to go.
        if let Err(e) = self.store.update(&self.job_id, update) {
            log::debug!("Dropping progress update: {}", e);
        }
    }
}

/// Collects events in memory.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}
