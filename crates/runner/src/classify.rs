//! Classifier selection

use testrig_common::{RunDescriptor, RunResult, TestGroup};

use crate::expect::Expectations;
use crate::tap;

/// How a finished run is turned into a [`TestGroup`]
#[derive(Debug, Clone)]
pub enum Classifier {
    /// Literal comparison against expected output and exit code
    Expect(Expectations),
    /// Protocol stream parsed from stdout, then checked against the exit code
    Tap,
}

impl Classifier {
    /// Literal expectations in the descriptor select the comparator
    pub fn for_descriptor(descriptor: &RunDescriptor) -> Self {
        if descriptor.has_expectations() {
            Self::Expect(Expectations::from(descriptor))
        } else {
            Self::Tap
        }
    }

    /// `program` is the target's display name used in exit-code messages
    pub fn classify(&self, name: &str, program: &str, result: &RunResult) -> TestGroup {
        match self {
            Self::Expect(expectations) => expectations.compare(name, result),
            Self::Tap => {
                let mut group = tap::parse(name, &result.stdout, &result.stderr);
                group.check_exit_code(result.exit_code, program);
                group
            }
        }
    }
}
