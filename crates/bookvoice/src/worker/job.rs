use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Kind of source document, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pdf,
    Txt,
}

impl SourceKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(SourceKind::Pdf),
            "txt" => Some(SourceKind::Txt),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Extractor flag that introduces the source file.
    pub fn extractor_flag(&self) -> &'static str {
        match self {
            SourceKind::Pdf => "--pdf",
            SourceKind::Txt => "--txt",
        }
    }
}

/// Voice cloning options for a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceCloning {
    pub sample_id: String,
    /// Expressiveness in [0, 1]; falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exaggeration: Option<f32>,
    /// Adherence to the reference voice in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfg_weight: Option<f32>,
}

/// A book submitted for conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSubmission {
    pub source_filename: String,
    pub source_bytes: Vec<u8>,
    pub title: String,
    /// Absent in JSON deserializes as empty and is then rejected by
    /// [`BookSubmission::validate`].
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    pub destination_root: PathBuf,
    /// Normalized speech speed in [0, 1]; 0.5 is normal speed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_speed: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_cloning: Option<VoiceCloning>,
}

fn check_unit_interval(field: &'static str, value: Option<f32>) -> Result<(), ValidationError> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(ValidationError::InvalidField {
            field,
            reason: format!("must be within [0, 1], got {}", v),
        }),
        _ => Ok(()),
    }
}

impl BookSubmission {
    /// Checks required fields and value ranges. A submission that fails here
    /// never becomes a job.
    pub fn validate(&self) -> Result<SourceKind, ValidationError> {
        if self.source_filename.trim().is_empty() {
            return Err(ValidationError::MissingField("sourceFilename"));
        }
        if self.source_bytes.is_empty() {
            return Err(ValidationError::MissingField("sourceBytes"));
        }
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingField("title"));
        }
        if self.author.trim().is_empty() {
            return Err(ValidationError::MissingField("author"));
        }
        if self.description.trim().is_empty() {
            return Err(ValidationError::MissingField("description"));
        }
        if self.destination_root.as_os_str().is_empty() {
            return Err(ValidationError::MissingField("destinationRoot"));
        }

        let file_name = self.file_name()?;
        let kind =
            SourceKind::from_path(Path::new(&file_name)).ok_or_else(|| ValidationError::InvalidField {
                field: "sourceFilename",
                reason: format!("unsupported source type '{}' (expected .pdf or .txt)", file_name),
            })?;

        check_unit_interval("speechSpeed", self.speech_speed)?;
        if let Some(voice) = &self.voice_cloning {
            if voice.sample_id.trim().is_empty() {
                return Err(ValidationError::MissingField("voiceCloning.sampleId"));
            }
            check_unit_interval("voiceCloning.exaggeration", voice.exaggeration)?;
            check_unit_interval("voiceCloning.cfgWeight", voice.cfg_weight)?;
        }

        Ok(kind)
    }

    /// The source filename stripped of any directory components.
    pub fn file_name(&self) -> Result<String, ValidationError> {
        Path::new(self.source_filename.trim())
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| ValidationError::InvalidField {
                field: "sourceFilename",
                reason: "not a file name".to_string(),
            })
    }

    /// Detects MIME type from the source filename using the mime_guess crate.
    pub fn mime_type(&self) -> Option<String> {
        mime_guess::from_path(&self.source_filename)
            .first()
            .map(|m| m.to_string())
    }
}

/// Final outcome of one conversion run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub job_id: String,
    pub success: bool,
    pub files_created: BTreeMap<String, PathBuf>,
    pub error: Option<String>,
}

impl JobResult {
    pub fn success(job_id: &str, files_created: BTreeMap<String, PathBuf>) -> Self {
        Self {
            job_id: job_id.to_string(),
            success: true,
            files_created,
            error: None,
        }
    }

    pub fn failure(job_id: &str, files_created: BTreeMap<String, PathBuf>, error: String) -> Self {
        Self {
            job_id: job_id.to_string(),
            success: false,
            files_created,
            error: Some(error),
        }
    }
}
