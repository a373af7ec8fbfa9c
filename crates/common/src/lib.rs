//! testrig common library
//!
//! Status model and the data passed between the harness, the classifiers
//! and the reporters.

pub mod faults;
pub mod group;
pub mod status;
pub mod types;

pub use faults::{FaultLog, ServerFault};
pub use group::{RunTotals, TestDetail, TestGroup, SERVER_ERRORS_GROUP};
pub use status::{Hue, StatusCounts, StatusKind};
pub use types::{
    format_seconds, timeout_line, RunDescriptor, RunResult, DEFAULT_TIMEOUT, TIMEOUT_PREFIX,
};

/// testrig version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
