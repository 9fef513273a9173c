//! Adapter for the external stage executables.
//!
//! Every stage goes through [`ProcessRunner`], which yields a typed
//! [`ProcessOutcome`] instead of raw exit codes.

pub mod outcome;
pub mod runner;
pub mod temp;

pub use outcome::{classify_exit, CrashSignature, ProcessOutcome, KNOWN_CRASH_MESSAGE};
pub use runner::{Invocation, ProcessReport, ProcessRunner, SystemProcessRunner};
pub use temp::TempTextFile;
