use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::storage::BookLayout;
use crate::text::TextChunk;
use crate::worker::job::{BookSubmission, SourceKind};

use super::error::PipelineWarning;

pub struct PipelineContext {
    // Input
    pub job_id: String,
    pub submission: BookSubmission,
    pub source_kind: SourceKind,

    // saving_file
    pub layout: Option<BookLayout>,
    pub source_path: Option<PathBuf>,

    // extracting_text
    pub text: Option<String>,
    pub chunks: Vec<TextChunk>,

    // generating_audio; fragments are in chunk order
    pub voice_prompt: Option<PathBuf>,
    pub fragments: Vec<PathBuf>,

    // combining_audio / adjusting_speed
    pub final_audio: Option<PathBuf>,

    /// Output files by role, as reported to the registry.
    pub files_created: BTreeMap<String, PathBuf>,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineContext {
    pub fn new(job_id: &str, submission: BookSubmission, source_kind: SourceKind) -> Self {
        Self {
            job_id: job_id.to_string(),
            submission,
            source_kind,
            layout: None,
            source_path: None,
            text: None,
            chunks: Vec::new(),
            voice_prompt: None,
            fragments: Vec::new(),
            final_audio: None,
            files_created: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }
}
