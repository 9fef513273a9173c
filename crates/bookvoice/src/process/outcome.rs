use serde::Serialize;

use crate::sanitize;

/// Windows `STATUS_ACCESS_VIOLATION`, reported by the ML executables when
/// they run out of memory on long inputs.
pub const ACCESS_VIOLATION_CODE: u32 = 0xC000_0005;

/// POSIX `SIGSEGV`.
pub const SEGFAULT_SIGNAL: i32 = 11;

/// Message shown to users for a [`ProcessOutcome::KnownCrash`].
pub const KNOWN_CRASH_MESSAGE: &str =
    "The process crashed (memory access violation). Try a shorter input or free up memory.";

/// Lines of output kept in a generic failure message.
pub const FAILURE_TAIL_LINES: usize = 6;

/// Platform-specific crash signature recognized as a known crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashSignature {
    /// Exit code `0xC0000005`.
    AccessViolation,
    /// Terminated by `SIGSEGV`.
    SegmentationFault,
}

/// Classified result of one external process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Success,
    KnownCrash {
        signature: CrashSignature,
    },
    GenericFailure {
        /// Exit code, or `None` when the process was killed by a signal.
        code: Option<i32>,
        /// Sanitized tail of stderr/stdout.
        output: String,
    },
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Success)
    }
}

/// Maps an exit status to an outcome.
///
/// `code` is the exit code (if any), `signal` the terminating signal on Unix
/// (if any), and `output` the captured output used for the failure tail.
pub fn classify_exit(code: Option<i32>, signal: Option<i32>, output: &str) -> ProcessOutcome {
    match (code, signal) {
        (Some(0), _) => ProcessOutcome::Success,
        (Some(code), _) if code as u32 == ACCESS_VIOLATION_CODE => ProcessOutcome::KnownCrash {
            signature: CrashSignature::AccessViolation,
        },
        (None, Some(SEGFAULT_SIGNAL)) => ProcessOutcome::KnownCrash {
            signature: CrashSignature::SegmentationFault,
        },
        (code, _) => ProcessOutcome::GenericFailure {
            code,
            output: sanitize::failure_tail(output, FAILURE_TAIL_LINES),
        },
    }
}
