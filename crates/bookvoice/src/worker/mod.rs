pub mod job;

pub use job::{BookSubmission, JobResult, SourceKind, VoiceCloning};
