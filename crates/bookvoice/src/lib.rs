pub mod audio;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod sanitize;
pub mod service;
pub mod storage;
pub mod telemetry;
pub mod text;
pub mod voice;
pub mod worker;

pub use broadcast::{JobProgressBroadcaster, JobProgressEvent, JobStage, JobStatus, JobStore};
pub use config::{load_settings, Settings};
pub use error::{
    AudioError, BookvoiceError, ConfigError, ProcessError, RegistryError, Result, SampleError,
    StorageError, ValidationError,
};
pub use pipeline::{Pipeline, PipelineConfig, PipelineContext};
pub use service::{ApiResponse, AudiobookService, JobTicket, StatusPoller};
pub use worker::{BookSubmission, JobResult, VoiceCloning};
