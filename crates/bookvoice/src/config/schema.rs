use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::text::DEFAULT_MAX_CHUNK_CHARS;

/// Application settings persisted as `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_voice_samples_dir")]
    pub voice_samples_dir: PathBuf,
    #[serde(default)]
    pub executables: ExecutablesConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub missing_sample_policy: MissingSamplePolicy,
    /// Finished jobs older than this are dropped from the registry. Unset
    /// keeps them until cleared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_job_ttl_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            voice_samples_dir: default_voice_samples_dir(),
            executables: ExecutablesConfig::default(),
            synthesis: SynthesisConfig::default(),
            alignment: AlignmentConfig::default(),
            missing_sample_policy: MissingSamplePolicy::default(),
            finished_job_ttl_secs: None,
        }
    }
}

/// `<data dir>/bookvoice/voice_samples`, or a relative fallback when the
/// platform has no data directory.
pub fn default_voice_samples_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("bookvoice"))
        .unwrap_or_else(|| PathBuf::from(".bookvoice"))
        .join("voice_samples")
}

/// Paths of the external stage executables. Bare names are looked up on
/// `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutablesConfig {
    #[serde(default = "default_extractor")]
    pub extractor: PathBuf,
    #[serde(default = "default_synthesizer")]
    pub synthesizer: PathBuf,
    #[serde(default = "default_aligner")]
    pub aligner: PathBuf,
    #[serde(default = "default_speed_adjuster")]
    pub speed_adjuster: PathBuf,
}

fn default_extractor() -> PathBuf {
    PathBuf::from("pdf_cli")
}

fn default_synthesizer() -> PathBuf {
    PathBuf::from("tts_cli")
}

fn default_aligner() -> PathBuf {
    PathBuf::from("whisperx_cli")
}

fn default_speed_adjuster() -> PathBuf {
    PathBuf::from("ffmpeg")
}

impl Default for ExecutablesConfig {
    fn default() -> Self {
        Self {
            extractor: default_extractor(),
            synthesizer: default_synthesizer(),
            aligner: default_aligner(),
            speed_adjuster: default_speed_adjuster(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisConfig {
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    /// Default expressiveness when a submission does not set one.
    #[serde(default = "default_half")]
    pub exaggeration: f32,
    /// Default adherence to the reference voice.
    #[serde(default = "default_half")]
    pub cfg_weight: f32,
    /// Accelerator passed as `--device`, e.g. `cuda` or `cpu`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

fn default_max_chunk_chars() -> usize {
    DEFAULT_MAX_CHUNK_CHARS
}

fn default_half() -> f32 {
    0.5
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            exaggeration: 0.5,
            cfg_weight: 0.5,
            device: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub output_format: AlignmentOutputFormat,
}

fn default_language() -> String {
    "auto".to_string()
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            output_format: AlignmentOutputFormat::default(),
        }
    }
}

/// Granularity of the alignment output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentOutputFormat {
    Words,
    Sentences,
    #[default]
    Both,
}

impl AlignmentOutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignmentOutputFormat::Words => "words",
            AlignmentOutputFormat::Sentences => "sentences",
            AlignmentOutputFormat::Both => "both",
        }
    }
}

/// What to do when a requested voice sample resolves to no file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSamplePolicy {
    /// Log a warning and synthesize with the standard voice.
    #[default]
    FallbackToStandard,
    /// Fail the job.
    Fail,
}
