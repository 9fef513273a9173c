//! Job progress events for push-style status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Named pipeline stage a job is currently in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Starting,
    SavingFile,
    ExtractingText,
    GeneratingAudio,
    CombiningAudio,
    AdjustingSpeed,
    Transcribing,
    Finalizing,
    Completed,
    Failed,
}

impl JobStage {
    /// Wire name, as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Starting => "starting",
            JobStage::SavingFile => "saving_file",
            JobStage::ExtractingText => "extracting_text",
            JobStage::GeneratingAudio => "generating_audio",
            JobStage::CombiningAudio => "combining_audio",
            JobStage::AdjustingSpeed => "adjusting_speed",
            JobStage::Transcribing => "transcribing",
            JobStage::Finalizing => "finalizing",
            JobStage::Completed => "completed",
            JobStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Completed | JobStage::Failed)
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStage::Starting => write!(f, "Starting"),
            JobStage::SavingFile => write!(f, "Saving file"),
            JobStage::ExtractingText => write!(f, "Extracting text"),
            JobStage::GeneratingAudio => write!(f, "Generating audio"),
            JobStage::CombiningAudio => write!(f, "Combining audio"),
            JobStage::AdjustingSpeed => write!(f, "Adjusting speed"),
            JobStage::Transcribing => write!(f, "Transcribing"),
            JobStage::Finalizing => write!(f, "Finalizing"),
            JobStage::Completed => write!(f, "Completed"),
            JobStage::Failed => write!(f, "Failed"),
        }
    }
}

/// Status of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

/// Snapshot of a job emitted after every registry write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub stage: JobStage,
    pub status: JobStatus,
    /// 0..=100, or -1 once failed.
    pub progress: i32,
    /// Human-readable message describing current activity.
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgressEvent {
    pub fn new(job_id: &str, stage: JobStage, progress: i32, message: &str) -> Self {
        let status = match stage {
            JobStage::Completed => JobStatus::Completed,
            JobStage::Failed => JobStatus::Failed,
            _ => JobStatus::Processing,
        };

        Self {
            job_id: job_id.to_string(),
            stage,
            status,
            progress,
            message: message.to_string(),
            timestamp: Utc::now(),
            error: None,
        }
    }
}

/// Broadcasts job progress events to any number of subscribers.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    /// Creates a new job progress broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a progress event to all subscribers.
    pub fn send(&self, event: JobProgressEvent) {
        // No active receivers is fine; polling remains the primary contract.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for JobProgressBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobProgressBroadcaster")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcaster_send_receive() {
        let broadcaster = JobProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        broadcaster.send(JobProgressEvent::new(
            "job-1",
            JobStage::GeneratingAudio,
            44,
            "Generating audio (1/2)",
        ));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.job_id, "job-1");
        assert_eq!(received.stage, JobStage::GeneratingAudio);
        assert_eq!(received.status, JobStatus::Processing);
        assert_eq!(received.progress, 44);
    }

    #[test]
    fn test_send_without_receivers_is_ignored() {
        let broadcaster = JobProgressBroadcaster::default();
        broadcaster.send(JobProgressEvent::new("job", JobStage::Starting, 0, "Starting"));
        assert_eq!(broadcaster.receiver_count(), 0);
    }

    #[test]
    fn test_terminal_stage_sets_status() {
        let event = JobProgressEvent::new("job", JobStage::Failed, -1, "boom");
        assert_eq!(event.status, JobStatus::Failed);
        assert!(event.stage.is_terminal());
    }

    #[test]
    fn test_stage_wire_names() {
        assert_eq!(JobStage::SavingFile.as_str(), "saving_file");
        assert_eq!(
            serde_json::to_string(&JobStage::AdjustingSpeed).unwrap(),
            "\"adjusting_speed\""
        );
        assert_eq!(JobStage::CombiningAudio.to_string(), "Combining audio");
    }
}
