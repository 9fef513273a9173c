//! Shared test utilities for bookvoice integration tests.
//!
//! - `harness::TestHarness` for isolated runs with temp library/voice/config dirs
//! - `harness::FakeStages`, a process runner that fabricates stage outputs

pub mod harness;
