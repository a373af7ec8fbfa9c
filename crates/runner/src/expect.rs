//! Literal-expectation comparator

use testrig_common::{RunDescriptor, RunResult, StatusKind, TestGroup};

/// Literal expectations for one test case
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expectations {
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exit_xfail: bool,
    pub stdout_xfail: bool,
    pub stderr_xfail: bool,
}

impl From<&RunDescriptor> for Expectations {
    fn from(d: &RunDescriptor) -> Self {
        Self {
            exit_code: d.expected_exit,
            stdout: d.expected_stdout.clone(),
            stderr: d.expected_stderr.clone(),
            exit_xfail: d.exit_xfail,
            stdout_xfail: d.stdout_xfail,
            stderr_xfail: d.stderr_xfail,
        }
    }
}

impl Expectations {
    /// Compare a run against the expectations: one detail per stream plus
    /// one for the exit code
    pub fn compare(&self, name: &str, result: &RunResult) -> TestGroup {
        let mut group = TestGroup::new(name);
        compare_stream(&mut group, "stdout", &self.stdout, &result.stdout, self.stdout_xfail);
        compare_stream(&mut group, "stderr", &self.stderr, &result.stderr, self.stderr_xfail);

        let message = [format!(
            "expected exit code {} got {}",
            self.exit_code, result.exit_code
        )];
        let matched = result.exit_code == self.exit_code;
        let id = if matched {
            "exited as expected"
        } else {
            "did not exit as expected"
        };
        group.add(verdict(matched, self.exit_xfail), message, id);
        group
    }
}

/// PASS/FAIL, or XPASS/XFAIL when failure was expected
fn verdict(matched: bool, xfail: bool) -> StatusKind {
    match (matched, xfail) {
        (true, false) => StatusKind::Pass,
        (true, true) => StatusKind::Xpass,
        (false, false) => StatusKind::Fail,
        (false, true) => StatusKind::Xfail,
    }
}

fn compare_stream(
    group: &mut TestGroup,
    stream: &str,
    expected: &[String],
    actual: &[String],
    xfail: bool,
) {
    let mut diff = Vec::new();
    for i in 0..expected.len().max(actual.len()) {
        let e = expected.get(i).map_or("", String::as_str);
        let a = actual.get(i).map_or("", String::as_str);
        if e != a {
            diff.push(format!("{stream}: line {} not as expected", i + 1));
            diff.push(format!("-{}", escape(e)));
            diff.push(format!("+{}", escape(a)));
        }
    }

    let id = if diff.is_empty() {
        format!("{stream} as expected")
    } else {
        format!("{stream} not as expected")
    };
    group.add(verdict(diff.is_empty(), xfail), diff, id);
}

/// Render control characters visibly so a diff line stays one line
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
