//! testrig runner
//!
//! Runs a target program once per discovered test script, captures its
//! output under a time budget and classifies the run, either against the
//! literal expectations in the script header or as a TAP-style stream.

pub mod classify;
pub mod config;
pub mod directive;
pub mod discovery;
pub mod error;
pub mod expect;
pub mod harness;
pub mod runner;
pub mod tap;

pub use classify::Classifier;
pub use config::RunnerConfig;
pub use discovery::{discover, TestCase, DEFAULT_PATTERNS};
pub use error::{RunnerError, RunnerResult};
pub use expect::Expectations;
pub use harness::{Invocation, KILL_GRACE};
pub use runner::{Debugger, Reporter, RunOutcome, TestRunner};
