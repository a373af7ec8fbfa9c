//! Run descriptors and harness results

use std::time::Duration;

use serde::Serialize;

/// Timeout applied when a test does not set one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(7);

/// Prefix of the synthetic stderr line appended on timeout
pub const TIMEOUT_PREFIX: &str = "TIMEOUT: ";

/// How one test case is to be executed and judged
#[derive(Debug, Clone, PartialEq)]
pub struct RunDescriptor {
    /// Wrap the test script in the suite's harness script
    pub use_harness: bool,

    /// Point the target at the fixture certificates
    pub use_certificates: bool,

    pub timeout: Duration,

    pub expected_exit: i32,
    pub expected_stdout: Vec<String>,
    pub expected_stderr: Vec<String>,

    pub exit_xfail: bool,
    pub stdout_xfail: bool,
    pub stderr_xfail: bool,

    /// Extra arguments placed before the script
    pub target_args: Vec<String>,

    /// Extra arguments placed after the script
    pub script_args: Vec<String>,

    /// Bytes piped to the target's stdin
    pub input: Vec<u8>,
}

impl Default for RunDescriptor {
    fn default() -> Self {
        Self {
            use_harness: true,
            use_certificates: true,
            timeout: DEFAULT_TIMEOUT,
            expected_exit: 0,
            expected_stdout: Vec::new(),
            expected_stderr: Vec::new(),
            exit_xfail: false,
            stdout_xfail: false,
            stderr_xfail: false,
            target_args: Vec::new(),
            script_args: Vec::new(),
            input: Vec::new(),
        }
    }
}

impl RunDescriptor {
    /// Literal expectations select the comparator over the protocol parser
    pub fn has_expectations(&self) -> bool {
        self.expected_exit != 0
            || !self.expected_stdout.is_empty()
            || !self.expected_stderr.is_empty()
    }
}

/// What a single target invocation produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// Exit code; negative values mean "killed by that signal"
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub timed_out: bool,
}

/// Text of the synthetic stderr line recorded when a run times out
pub fn timeout_line(timeout: Duration) -> String {
    format!(
        "{TIMEOUT_PREFIX}Process terminated after {} seconds.",
        format_seconds(timeout)
    )
}

/// Seconds as a decimal, always with at least one fractional digit
pub fn format_seconds(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{secs:.1}")
    } else {
        format!("{secs}")
    }
}
