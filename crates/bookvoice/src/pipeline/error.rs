use std::path::PathBuf;

use thiserror::Error;

/// Failure of one pipeline stage. The `Display` text becomes the job's
/// failure message.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid submission: {0}")]
    Validation(#[from] crate::error::ValidationError),

    #[error("{0}")]
    Process(#[from] crate::error::ProcessError),

    #[error("Combining audio failed: {0}")]
    Audio(#[from] crate::error::AudioError),

    #[error("Storage failed: {0}")]
    Storage(#[from] crate::error::StorageError),

    #[error("Voice sample unavailable: {0}")]
    Sample(#[from] crate::error::SampleError),

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("No text found in the source document")]
    NoText,

    #[error("{stage} finished without producing {}", crate::sanitize::redact_path(.path))]
    MissingOutput { stage: &'static str, path: PathBuf },

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Non-fatal conditions recorded while a job runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineWarning {
    SampleFallback { sample_id: String },
    CleanupFailed { path: String, error: String },
}
