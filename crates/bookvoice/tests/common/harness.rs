//! Test harness for isolated service runs.
//!
//! The stage executables are replaced by [`FakeStages`], which writes the
//! files each real executable would produce. Fragments are real 16-bit PCM
//! WAV files written with `hound`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use bookvoice::process::{classify_exit, Invocation, ProcessOutcome, ProcessReport, ProcessRunner};
use bookvoice::{AudiobookService, BookSubmission, ProcessError, Settings};

pub const FRAGMENT_SAMPLE_RATE: u32 = 22050;

/// Fabricates extractor, synthesizer, speed and aligner outputs.
pub struct FakeStages {
    calls: Mutex<Vec<Invocation>>,
    generated: AtomicUsize,
    fail_stage: Option<(&'static str, String)>,
    crash_stage: Option<&'static str>,
    /// Sample rate used for every fragment after the first.
    later_fragment_rate: u32,
}

impl Default for FakeStages {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            generated: AtomicUsize::new(0),
            fail_stage: None,
            crash_stage: None,
            later_fragment_rate: FRAGMENT_SAMPLE_RATE,
        }
    }
}

impl FakeStages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `stage` exit with code 1 printing `output`.
    pub fn failing(stage: &'static str, output: &str) -> Self {
        Self {
            fail_stage: Some((stage, output.to_string())),
            ..Self::default()
        }
    }

    /// Makes `stage` die with a memory access violation.
    pub fn crashing(stage: &'static str) -> Self {
        Self {
            crash_stage: Some(stage),
            ..Self::default()
        }
    }

    /// Fragments after the first get a different sample rate.
    pub fn mismatched_rates(rate: u32) -> Self {
        Self {
            later_fragment_rate: rate,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stage_calls(&self, stage: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|inv| inv.stage == stage)
            .collect()
    }

    fn path_arg(inv: &Invocation, flag: &str) -> PathBuf {
        PathBuf::from(inv.flag_value(flag).expect("missing path argument"))
    }

    fn extract(inv: &Invocation) -> ProcessReport {
        let source = inv
            .flag_value("--txt")
            .or_else(|| inv.flag_value("--pdf"))
            .map(PathBuf::from)
            .expect("missing source argument");
        let out = Self::path_arg(inv, "--outdir").join("pdf_result.md");
        std::fs::copy(&source, &out).unwrap();
        ProcessReport::success(format!(
            "Loading model...\n{}\n",
            serde_json::json!({"success": true, "output_path": out.display().to_string()})
        ))
    }

    fn synthesize(&self, inv: &Invocation) -> ProcessReport {
        let text = std::fs::read_to_string(Self::path_arg(inv, "--text-file")).unwrap();
        let index = self.generated.fetch_add(1, Ordering::SeqCst);
        let rate = if index == 0 {
            FRAGMENT_SAMPLE_RATE
        } else {
            self.later_fragment_rate
        };
        write_fragment(&Self::path_arg(inv, "--out"), rate, text.chars().count());
        ProcessReport::success("")
    }

    fn align(inv: &Invocation) -> ProcessReport {
        let dir = Self::path_arg(inv, "--outdir");
        std::fs::write(dir.join("text_mappings.json"), b"[]").unwrap();
        std::fs::write(dir.join("text_mappings_words.json"), b"[]").unwrap();
        std::fs::write(dir.join("transcription.json"), b"{}").unwrap();
        ProcessReport::success("")
    }
}

#[async_trait]
impl ProcessRunner for FakeStages {
    async fn run(&self, inv: &Invocation) -> Result<ProcessReport, ProcessError> {
        self.calls.lock().unwrap().push(inv.clone());

        if self.crash_stage == Some(inv.stage.as_str()) {
            return Ok(ProcessReport {
                outcome: classify_exit(Some(0xC000_0005_u32 as i32), None, ""),
                stdout: String::new(),
                stderr: String::new(),
            });
        }
        if let Some((stage, output)) = &self.fail_stage {
            if stage == &inv.stage {
                return Ok(ProcessReport {
                    outcome: classify_exit(Some(1), None, output),
                    stdout: String::new(),
                    stderr: output.clone(),
                });
            }
        }

        let report = match inv.stage.as_str() {
            "extracting_text" => Self::extract(inv),
            "generating_audio" => self.synthesize(inv),
            "adjusting_speed" => {
                let input = Self::path_arg(inv, "-i");
                let output = PathBuf::from(inv.args.last().unwrap());
                std::fs::copy(input, output).unwrap();
                ProcessReport::success("")
            }
            "transcribing" => Self::align(inv),
            other => ProcessReport {
                outcome: ProcessOutcome::GenericFailure {
                    code: Some(2),
                    output: format!("unknown stage {}", other),
                },
                stdout: String::new(),
                stderr: String::new(),
            },
        };
        Ok(report)
    }
}

/// Writes a mono 16-bit fragment with `samples` samples.
pub fn write_fragment(path: &Path, sample_rate: u32, samples: usize) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..samples {
        writer.write_sample((i % 64) as i16 * 100).unwrap();
    }
    writer.finalize().unwrap();
}

/// Isolated environment: library, voice sample and config dirs under one
/// temp dir, plus a service wired to a [`FakeStages`] runner.
pub struct TestHarness {
    temp_dir: TempDir,
    pub library_dir: PathBuf,
    pub voices_dir: PathBuf,
    pub settings_path: PathBuf,
    pub stages: Arc<FakeStages>,
    pub service: AudiobookService,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_stages(FakeStages::new(), Settings::default())
    }

    pub fn with_stages(stages: FakeStages, settings: Settings) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let library_dir = base.join("library");
        let voices_dir = base.join("voices");
        let settings_path = base.join("config").join("settings.json");
        std::fs::create_dir_all(&library_dir).expect("Failed to create library dir");

        let settings = Settings {
            voice_samples_dir: voices_dir.clone(),
            ..settings
        };
        let stages = Arc::new(stages);
        let service = AudiobookService::new(settings, stages.clone() as Arc<dyn ProcessRunner>)
            .with_settings_path(&settings_path);

        Self {
            temp_dir,
            library_dir,
            voices_dir,
            settings_path,
            stages,
            service,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A `.txt` submission targeting the harness library.
    pub fn submission(&self, title: &str, text: &str) -> BookSubmission {
        BookSubmission {
            source_filename: format!("{}.txt", title.to_lowercase()),
            source_bytes: text.as_bytes().to_vec(),
            title: title.to_string(),
            author: "Test Author".to_string(),
            description: "Integration test book".to_string(),
            destination_root: self.library_dir.clone(),
            speech_speed: None,
            voice_cloning: None,
        }
    }

    pub fn book_dir(&self, folder: &str) -> PathBuf {
        self.library_dir.join(folder)
    }
}
