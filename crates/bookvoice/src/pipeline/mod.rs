pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod runner;
pub mod stage;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::{PipelineError, PipelineWarning};
pub use progress::{
    NoopProgress, ProgressEvent, ProgressReporter, RecordingProgress, RegistryProgress,
};
pub use runner::Pipeline;
