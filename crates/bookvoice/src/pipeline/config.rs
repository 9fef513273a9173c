use std::path::PathBuf;

use crate::config::schema::{AlignmentOutputFormat, ExecutablesConfig, MissingSamplePolicy};
use crate::config::Settings;

pub struct PipelineConfig {
    pub executables: ExecutablesConfig,
    pub max_chunk_chars: usize,
    pub exaggeration: f32,
    pub cfg_weight: f32,
    pub device: Option<String>,
    pub alignment_language: String,
    pub alignment_output_format: AlignmentOutputFormat,
    pub voice_samples_dir: PathBuf,
    pub missing_sample_policy: MissingSamplePolicy,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            executables: settings.executables.clone(),
            max_chunk_chars: settings.synthesis.max_chunk_chars,
            exaggeration: settings.synthesis.exaggeration,
            cfg_weight: settings.synthesis.cfg_weight,
            device: settings.synthesis.device.clone(),
            alignment_language: settings.alignment.language.clone(),
            alignment_output_format: settings.alignment.output_format,
            voice_samples_dir: settings.voice_samples_dir.clone(),
            missing_sample_policy: settings.missing_sample_policy,
        }
    }
}
