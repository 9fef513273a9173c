use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info_span, trace, Instrument};

use crate::error::ProcessError;
use crate::sanitize;

use super::outcome::{classify_exit, ProcessOutcome, KNOWN_CRASH_MESSAGE};

/// One invocation of an external stage executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Stage label used in logs and error messages.
    pub stage: String,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(stage: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            stage: stage.into(),
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Appends `flag value`.
    pub fn flag(self, flag: &str, value: impl AsRef<OsStr>) -> Self {
        self.arg(flag).arg(value)
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Value following `flag`, if present.
    pub fn flag_value(&self, flag: &str) -> Option<&OsStr> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|v| v.as_os_str())
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

/// Captured result of an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub outcome: ProcessOutcome,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessReport {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            outcome: ProcessOutcome::Success,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Converts a non-success outcome into the matching [`ProcessError`].
    pub fn into_result(self, stage: &str) -> Result<ProcessReport, ProcessError> {
        match &self.outcome {
            ProcessOutcome::Success => Ok(self),
            ProcessOutcome::KnownCrash { .. } => Err(ProcessError::KnownCrash {
                stage: stage.to_string(),
                message: KNOWN_CRASH_MESSAGE.to_string(),
            }),
            ProcessOutcome::GenericFailure { code, output } => Err(ProcessError::Failed {
                stage: stage.to_string(),
                code: code.unwrap_or(-1),
                output: if output.is_empty() {
                    "no output".to_string()
                } else {
                    output.clone()
                },
            }),
        }
    }

    /// Last non-empty stdout line.
    pub fn last_stdout_line(&self) -> Option<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
    }
}

/// Runs external executables.
///
/// The production implementation spawns real processes; tests substitute a
/// runner that fabricates stage outputs.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs the invocation to completion.
    ///
    /// Returns `Err` only when the process could not be started or its
    /// output could not be collected; exit status is reported through
    /// [`ProcessReport::outcome`].
    async fn run(&self, invocation: &Invocation) -> Result<ProcessReport, ProcessError>;
}

/// Spawns processes with tokio, streaming their output into the log.
#[derive(Debug, Clone, Default)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

async fn collect_lines<R>(reader: Option<R>, stage: &str, stream: &'static str) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };

    let mut collected = String::new();
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if sanitize::is_benign_line(&line) {
                    trace!(stage, stream, "{}", line);
                } else {
                    debug!(stage, stream, "{}", line);
                }
                collected.push_str(&line);
                collected.push('\n');
            }
            Ok(None) => break,
            Err(e) => {
                log::warn!("Failed to read {} of {}: {}", stream, stage, e);
                break;
            }
        }
    }
    collected
}

#[cfg(unix)]
fn terminating_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn terminating_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessReport, ProcessError> {
        let program_name = sanitize::redact_path(&invocation.program);
        let span = info_span!("process", stage = %invocation.stage, program = %program_name);

        async move {
            let mut cmd = TokioCommand::new(&invocation.program);
            cmd.args(&invocation.args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(false);
            if let Some(dir) = &invocation.current_dir {
                cmd.current_dir(dir);
            }
            for (key, value) in &invocation.env {
                cmd.env(key, value);
            }

            let mut child = cmd.spawn().map_err(|e| ProcessError::Spawn {
                program: program_name.clone(),
                source: e,
            })?;

            let stdout = child.stdout.take();
            let stderr = child.stderr.take();
            let (stdout, stderr) = tokio::join!(
                collect_lines(stdout, &invocation.stage, "stdout"),
                collect_lines(stderr, &invocation.stage, "stderr"),
            );

            let status = child.wait().await.map_err(|e| ProcessError::Io {
                stage: invocation.stage.clone(),
                source: e,
            })?;

            // stderr carries the diagnostics; stdout follows as a fallback.
            let combined = format!("{}{}", stdout, stderr);
            let outcome = classify_exit(status.code(), terminating_signal(&status), &combined);
            debug!(?outcome, "process exited");

            Ok(ProcessReport {
                outcome,
                stdout,
                stderr,
            })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_invocation_builder() {
        let inv = Invocation::new("synthesis", "/opt/tts_cli")
            .flag("--text-file", "/tmp/a.txt")
            .flag("--out", "/tmp/a.wav")
            .arg("--verbose")
            .env("TOKENIZERS_PARALLELISM", "false");

        assert_eq!(inv.flag_value("--out"), Some(OsStr::new("/tmp/a.wav")));
        assert_eq!(inv.flag_value("--prompt"), None);
        assert!(inv.has_arg("--verbose"));
        assert_eq!(inv.env.len(), 1);
    }

    #[test]
    fn test_into_result_maps_outcomes() {
        assert!(ProcessReport::success("ok").into_result("x").is_ok());

        let crash = ProcessReport {
            outcome: ProcessOutcome::KnownCrash {
                signature: super::super::CrashSignature::AccessViolation,
            },
            stdout: String::new(),
            stderr: String::new(),
        };
        match crash.into_result("synthesis") {
            Err(ProcessError::KnownCrash { stage, message }) => {
                assert_eq!(stage, "synthesis");
                assert!(message.contains("shorter input"));
            }
            other => panic!("expected KnownCrash, got {:?}", other),
        }

        let failed = ProcessReport {
            outcome: ProcessOutcome::GenericFailure {
                code: Some(2),
                output: String::new(),
            },
            stdout: String::new(),
            stderr: String::new(),
        };
        match failed.into_result("alignment") {
            Err(ProcessError::Failed { code, output, .. }) => {
                assert_eq!(code, 2);
                assert_eq!(output, "no output");
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn test_last_stdout_line() {
        let report = ProcessReport::success("Loading...\n{\"success\": true}\n\n");
        assert_eq!(report.last_stdout_line(), Some("{\"success\": true}"));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let runner = SystemProcessRunner::new();
        let inv = Invocation::new("extraction", "/definitely/not/a/real/binary");
        let err = runner.run(&inv).await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_captures_stdout() {
        let runner = SystemProcessRunner::new();
        let inv = Invocation::new("echo", "sh").arg("-c").arg("echo hello; echo warn 1>&2");
        let report = runner.run(&inv).await.unwrap();
        assert!(report.outcome.is_success());
        assert_eq!(report.stdout.trim(), "hello");
        assert_eq!(report.stderr.trim(), "warn");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_generic_failure_with_sanitized_tail() {
        let runner = SystemProcessRunner::new();
        let inv = Invocation::new("synthesis", "sh").arg("-c").arg(
            "echo 'FutureWarning: deprecated thing' 1>&2; echo 'RuntimeError: boom' 1>&2; exit 3",
        );
        let report = runner.run(&inv).await.unwrap();
        assert_eq!(
            report.outcome,
            ProcessOutcome::GenericFailure {
                code: Some(3),
                output: "RuntimeError: boom".to_string(),
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_segfault_is_known_crash() {
        let runner = SystemProcessRunner::new();
        let inv = Invocation::new("synthesis", "sh")
            .arg("-c")
            .arg("kill -SEGV $$");
        let report = runner.run(&inv).await.unwrap();
        assert!(matches!(report.outcome, ProcessOutcome::KnownCrash { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_and_current_dir_are_applied() {
        let tmp = tempfile::TempDir::new().unwrap();
        let runner = SystemProcessRunner::new();
        let inv = Invocation::new("env", "sh")
            .arg("-c")
            .arg("echo \"$BOOKVOICE_TEST\"; pwd")
            .env("BOOKVOICE_TEST", "value")
            .current_dir(tmp.path());
        let report = runner.run(&inv).await.unwrap();
        let lines: Vec<&str> = report.stdout.lines().collect();
        assert_eq!(lines[0], "value");
        assert_eq!(
            Path::new(lines[1]).canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }
}
