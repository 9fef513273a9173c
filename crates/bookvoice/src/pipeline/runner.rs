use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::audio::{
    needs_adjustment, remove_fragments, speed_invocation, splice_fragments, tempo_multiplier,
};
use crate::broadcast::job_progress::JobStage;
use crate::config::schema::MissingSamplePolicy;
use crate::error::{SampleError, StorageError};
use crate::process::{
    Invocation, ProcessReport, ProcessRunner, SystemProcessRunner, TempTextFile,
};
use crate::sanitize;
use crate::storage::{BookLayout, BookMetadata, BookStorage};
use crate::text::chunk_text;
use crate::voice;
use crate::worker::job::JobResult;

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::{PipelineError, PipelineWarning};
use super::progress::{ProgressEvent, ProgressReporter};
use super::stage;

/// The ML executables fork after loading their tokenizers.
const TOKENIZERS_PARALLELISM: &str = "TOKENIZERS_PARALLELISM";

/// Status line printed by the extractor as its last stdout line.
#[derive(Debug, Default, Deserialize)]
struct ExtractorReport {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    output_path: Option<String>,
    #[serde(default)]
    cover_filename: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn parse_extractor_report(report: &ProcessReport) -> Option<ExtractorReport> {
    let line = report.last_stdout_line()?;
    match serde_json::from_str(line) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!("Extractor status line is not JSON: {}", e);
            None
        }
    }
}

/// Runs blocking file work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))?
}

fn record_file(
    ctx: &mut PipelineContext,
    progress: &dyn ProgressReporter,
    role: &str,
    path: &Path,
) {
    ctx.files_created.insert(role.to_string(), path.to_path_buf());
    progress.report(ProgressEvent::file(role, path));
}

fn require_output(stage: &'static str, path: &Path) -> Result<(), PipelineError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PipelineError::MissingOutput {
            stage,
            path: path.to_path_buf(),
        })
    }
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    runner: Arc<dyn ProcessRunner>,
}

impl Pipeline {
    /// Production constructor: stage executables run as real processes.
    pub fn from_config(config: Arc<PipelineConfig>) -> Self {
        Self::new(config, Arc::new(SystemProcessRunner::new()))
    }

    pub fn new(config: Arc<PipelineConfig>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage for one book, in order.
    ///
    /// The first failing stage aborts the run; files written so far stay on
    /// disk. The reporter always receives exactly one terminal event.
    pub async fn run(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> (JobResult, PipelineContext) {
        let filename = sanitize::redact_path(Path::new(&ctx.submission.source_filename));
        let span = info_span!("pipeline", job_id = %ctx.job_id, filename = %filename);

        let outcome = self
            .run_stages(&mut ctx, progress)
            .instrument(span.clone())
            .await;

        span.in_scope(|| {
            for warning in &ctx.warnings {
                warn!(?warning, "pipeline warning");
            }
        });

        match outcome {
            Ok(()) => {
                span.in_scope(|| info!("Audiobook ready"));
                progress.report(ProgressEvent::Completed {
                    message: "Audiobook ready".to_string(),
                });
                let result = JobResult::success(&ctx.job_id, ctx.files_created.clone());
                (result, ctx)
            }
            Err(e) => {
                let err_msg = e.to_string();
                span.in_scope(|| warn!(error = %err_msg, "pipeline failed"));
                progress.report(ProgressEvent::Failed {
                    error: err_msg.clone(),
                });
                let result = JobResult::failure(&ctx.job_id, ctx.files_created.clone(), err_msg);
                (result, ctx)
            }
        }
    }

    async fn run_stages(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        progress.report(ProgressEvent::stage(
            JobStage::Starting,
            stage::STARTING,
            "Starting",
        ));

        let layout = self
            .step_save_file(ctx, progress)
            .instrument(info_span!("save_file"))
            .await?;

        let text = self
            .step_extract_text(ctx, &layout, progress)
            .instrument(info_span!("extract_text"))
            .await?;

        self.step_chunk_text(ctx, &text)?;
        self.step_resolve_voice(ctx)?;

        let chunk_count = ctx.chunks.len();
        self.step_generate_audio(ctx, &layout, progress)
            .instrument(info_span!("generate_audio", chunks = chunk_count))
            .await?;

        let multiplier = ctx
            .submission
            .speech_speed
            .map(tempo_multiplier)
            .filter(|m| needs_adjustment(*m));

        let combined = self
            .step_combine_audio(ctx, &layout, multiplier.is_some(), progress)
            .instrument(info_span!("combine_audio"))
            .await?;

        let final_audio = match multiplier {
            Some(m) => {
                self.step_adjust_speed(ctx, &layout, &combined, m, progress)
                    .instrument(info_span!("adjust_speed", multiplier = m))
                    .await?
            }
            None => combined,
        };
        record_file(ctx, progress, "audio", &final_audio);
        ctx.final_audio = Some(final_audio.clone());

        self.step_transcribe(ctx, &layout, &final_audio, progress)
            .instrument(info_span!("transcribe"))
            .await?;

        self.step_finalize(ctx, &layout, progress)
            .instrument(info_span!("finalize"))
            .await
    }

    async fn step_save_file(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<BookLayout, PipelineError> {
        progress.report(ProgressEvent::stage(
            JobStage::SavingFile,
            stage::SAVING_FILE,
            "Saving source file",
        ));

        let root = ctx.submission.destination_root.clone();
        let title = ctx.submission.title.clone();
        let file_name = ctx.submission.file_name()?;
        // The bytes are not needed past this stage.
        let bytes = std::mem::take(&mut ctx.submission.source_bytes);

        let (layout, source_path) = blocking(move || {
            let storage = BookStorage::new(&root);
            let layout = storage.prepare(&title)?;
            let source_path = storage.write_source(&layout, &file_name, &bytes)?;
            Ok((layout, source_path))
        })
        .await?;

        debug!(folder = %layout.folder_id, "Saved source file");
        record_file(ctx, progress, "source", &source_path);
        ctx.layout = Some(layout.clone());
        ctx.source_path = Some(source_path);
        Ok(layout)
    }

    async fn step_extract_text(
        &self,
        ctx: &mut PipelineContext,
        layout: &BookLayout,
        progress: &dyn ProgressReporter,
    ) -> Result<String, PipelineError> {
        progress.report(ProgressEvent::stage(
            JobStage::ExtractingText,
            stage::EXTRACTING_TEXT,
            "Extracting text",
        ));

        let source_path = ctx
            .source_path
            .clone()
            .ok_or_else(|| PipelineError::Extraction("source file was not saved".to_string()))?;

        let inv = Invocation::new("extracting_text", &self.config.executables.extractor)
            .flag(ctx.source_kind.extractor_flag(), &source_path)
            .flag("--outdir", &layout.book_dir)
            .env(TOKENIZERS_PARALLELISM, "false");
        let report = self.runner.run(&inv).await?;

        // The extractor prints its status line and then exits non-zero on
        // failure; the reported reason beats the raw output tail.
        let status = parse_extractor_report(&report);
        if let Some(status) = &status {
            if !status.success {
                let reason = status
                    .error
                    .clone()
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "extractor reported failure".to_string());
                return Err(PipelineError::Extraction(reason));
            }
        }
        report.into_result("Text extraction")?;

        let text_path = status
            .as_ref()
            .and_then(|s| s.output_path.as_deref())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| layout.text_path());
        require_output("Text extraction", &text_path)?;

        let text = tokio::fs::read_to_string(&text_path)
            .await
            .map_err(|e| StorageError::ReadFile {
                path: text_path.clone(),
                source: e,
            })?;
        record_file(ctx, progress, "text", &text_path);

        if let Some(cover) = status
            .as_ref()
            .and_then(|s| s.cover_filename.as_deref())
            .filter(|c| !c.is_empty())
        {
            let cover_path = layout.book_dir.join(cover);
            if cover_path.is_file() {
                record_file(ctx, progress, "cover", &cover_path);
            }
        }

        let chars = text.chars().count();
        info!(chars, "Extracted text");
        progress.report(ProgressEvent::stage(
            JobStage::ExtractingText,
            stage::TEXT_EXTRACTED,
            format!("Extracted {} characters", chars),
        ));
        Ok(text)
    }

    fn step_chunk_text(&self, ctx: &mut PipelineContext, text: &str) -> Result<(), PipelineError> {
        let chunks = chunk_text(text, self.config.max_chunk_chars);
        if chunks.is_empty() {
            return Err(PipelineError::NoText);
        }
        debug!(
            chunks = chunks.len(),
            max_chars = self.config.max_chunk_chars,
            "Split text into chunks"
        );
        ctx.text = Some(text.to_string());
        ctx.chunks = chunks;
        Ok(())
    }

    fn step_resolve_voice(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let Some(voice) = &ctx.submission.voice_cloning else {
            return Ok(());
        };

        match voice::resolve(&voice.sample_id, &self.config.voice_samples_dir) {
            Ok(path) => {
                debug!(sample = %sanitize::redact_path(&path), "Using voice sample");
                ctx.voice_prompt = Some(path);
                Ok(())
            }
            Err(SampleError::NotFound(sample_id))
                if self.config.missing_sample_policy == MissingSamplePolicy::FallbackToStandard =>
            {
                warn!(%sample_id, "Voice sample not found, using the standard voice");
                ctx.warnings.push(PipelineWarning::SampleFallback { sample_id });
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn step_generate_audio(
        &self,
        ctx: &mut PipelineContext,
        layout: &BookLayout,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        let total = ctx.chunks.len();
        let voice = ctx.submission.voice_cloning.as_ref();
        let exaggeration = voice
            .and_then(|v| v.exaggeration)
            .unwrap_or(self.config.exaggeration);
        let cfg_weight = voice
            .and_then(|v| v.cfg_weight)
            .unwrap_or(self.config.cfg_weight);

        let mut fragments = Vec::with_capacity(total);
        for (done, chunk) in ctx.chunks.iter().enumerate() {
            progress.report(ProgressEvent::stage(
                JobStage::GeneratingAudio,
                stage::generating_progress(done, total),
                format!("Generating audio ({}/{})", done + 1, total),
            ));

            let fragment = layout.fragment_path(chunk.index);
            // Removed when it goes out of scope, whatever the outcome.
            let text_file = TempTextFile::create_in(&layout.chunks_dir, "chunk", &chunk.text)?;

            let mut inv = Invocation::new("generating_audio", &self.config.executables.synthesizer)
                .flag("--text-file", text_file.path())
                .flag("--out", &fragment)
                .flag("--exaggeration", exaggeration.to_string())
                .flag("--cfg-weight", cfg_weight.to_string())
                .env(TOKENIZERS_PARALLELISM, "false");
            if let Some(prompt) = &ctx.voice_prompt {
                inv = inv.flag("--prompt", prompt);
            }
            if let Some(device) = &self.config.device {
                inv = inv.flag("--device", device);
            }

            self.runner.run(&inv).await?.into_result("Speech synthesis")?;
            require_output("Speech synthesis", &fragment)?;
            debug!(chunk = chunk.index, chars = chunk.char_len(), "Synthesized chunk");
            fragments.push(fragment);
        }

        progress.report(ProgressEvent::stage(
            JobStage::GeneratingAudio,
            stage::generating_progress(total, total),
            format!("Generated {} audio fragments", total),
        ));
        ctx.fragments = fragments;
        Ok(())
    }

    async fn step_combine_audio(
        &self,
        ctx: &mut PipelineContext,
        layout: &BookLayout,
        speed_follows: bool,
        progress: &dyn ProgressReporter,
    ) -> Result<PathBuf, PipelineError> {
        progress.report(ProgressEvent::stage(
            JobStage::CombiningAudio,
            stage::COMBINING_AUDIO,
            format!("Combining {} audio fragments", ctx.fragments.len()),
        ));

        let output = if speed_follows {
            layout.combined_audio_path()
        } else {
            layout.final_audio_path()
        };

        let fragments = ctx.fragments.clone();
        let chunks_dir = layout.chunks_dir.clone();
        let target = output.clone();
        let summary = blocking(move || {
            let summary = splice_fragments(&fragments, &target)?;
            remove_fragments(&fragments);
            // Only succeeds once the folder is empty.
            let _ = std::fs::remove_dir(&chunks_dir);
            Ok(summary)
        })
        .await?;

        info!(
            fragments = summary.fragment_count,
            payload_bytes = summary.payload_len,
            format = %summary.format,
            "Combined audio"
        );
        ctx.fragments.clear();
        Ok(output)
    }

    async fn step_adjust_speed(
        &self,
        ctx: &mut PipelineContext,
        layout: &BookLayout,
        combined: &Path,
        multiplier: f32,
        progress: &dyn ProgressReporter,
    ) -> Result<PathBuf, PipelineError> {
        progress.report(ProgressEvent::stage(
            JobStage::AdjustingSpeed,
            stage::ADJUSTING_SPEED,
            format!("Adjusting speed (x{:.2})", multiplier),
        ));

        let final_audio = layout.final_audio_path();
        let inv = speed_invocation(
            &self.config.executables.speed_adjuster,
            combined,
            &final_audio,
            multiplier,
        );
        self.runner.run(&inv).await?.into_result("Speed adjustment")?;
        require_output("Speed adjustment", &final_audio)?;

        if let Err(e) = tokio::fs::remove_file(combined).await {
            ctx.warnings.push(PipelineWarning::CleanupFailed {
                path: sanitize::redact_path(combined),
                error: e.to_string(),
            });
        }

        progress.report(ProgressEvent::stage(
            JobStage::AdjustingSpeed,
            stage::SPEED_ADJUSTED,
            "Speed adjusted",
        ));
        Ok(final_audio)
    }

    async fn step_transcribe(
        &self,
        ctx: &mut PipelineContext,
        layout: &BookLayout,
        audio: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        progress.report(ProgressEvent::stage(
            JobStage::Transcribing,
            stage::TRANSCRIBING,
            "Aligning text with audio",
        ));

        let inv = Invocation::new("transcribing", &self.config.executables.aligner)
            .flag("--audio", audio)
            .flag("--outdir", &layout.book_dir)
            .flag("--language", &self.config.alignment_language)
            .flag("--output-format", self.config.alignment_output_format.as_str())
            .env(TOKENIZERS_PARALLELISM, "false");
        self.runner.run(&inv).await?.into_result("Alignment")?;

        for (role, path) in layout.alignment_outputs() {
            if path.is_file() {
                record_file(ctx, progress, role, &path);
            }
        }
        Ok(())
    }

    async fn step_finalize(
        &self,
        ctx: &mut PipelineContext,
        layout: &BookLayout,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        progress.report(ProgressEvent::stage(
            JobStage::Finalizing,
            stage::FINALIZING,
            "Writing metadata",
        ));

        let metadata = BookMetadata {
            title: ctx.submission.title.trim().to_string(),
            author: ctx.submission.author.trim().to_string(),
            description: ctx.submission.description.trim().to_string(),
            folder_id: layout.folder_id.clone(),
            created_at: Utc::now(),
        };
        let root = ctx.submission.destination_root.clone();
        let target = layout.clone();
        let path = blocking(move || {
            BookStorage::new(&root)
                .write_metadata(&target, &metadata)
                .map_err(PipelineError::from)
        })
        .await?;

        record_file(ctx, progress, "metadata", &path);
        Ok(())
    }
}
