use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookvoiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("External process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Registry(#[from] RegistryError),

    #[error("Voice sample error: {0}")]
    Sample(#[from] SampleError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} crashed: {message}")]
    KnownCrash { stage: String, message: String },

    #[error("{stage} failed with exit code {code}: {output}")]
    Failed {
        stage: String,
        code: i32,
        output: String,
    },

    #[error("{stage} I/O error: {source}")]
    Io {
        stage: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Invalid WAV data in '{}': {reason}", crate::sanitize::redact_path(.path))]
    Format { path: PathBuf, reason: String },

    #[error(
        "Audio format mismatch in fragment {index} ('{}'): expected {expected}, found {found}",
        crate::sanitize::redact_path(.path)
    )]
    FormatMismatch {
        index: usize,
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("No audio fragments to combine")]
    NoFragments,

    #[error("Audio I/O error on '{}': {source}", crate::sanitize::redact_path(.path))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No free book folder name near '{0}'")]
    FolderExists(PathBuf),

    #[error("Invalid metadata in '{path}': {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Job not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("Voice sample not found: {0}")]
    NotFound(String),

    #[error("Invalid voice sample name: {0}")]
    InvalidName(String),

    #[error("Voice sample directory error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, BookvoiceError>;
