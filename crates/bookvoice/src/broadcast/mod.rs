//! Job registry and progress event streaming.

pub mod job_progress;
pub mod job_store;

pub use job_progress::{JobProgressBroadcaster, JobProgressEvent, JobStage, JobStatus};
pub use job_store::{JobStore, JobUpdate, StoredJob, COMPLETED_PROGRESS, FAILED_PROGRESS};
