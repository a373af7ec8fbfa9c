//! Test details, per-test groups and run-level totals

use serde::Serialize;

use crate::faults::ServerFault;
use crate::status::{StatusCounts, StatusKind};

/// Name of the synthetic group carrying fixture-server faults
pub const SERVER_ERRORS_GROUP: &str = "HTTP server errors";

/// One classified observation about a test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestDetail {
    pub message: Vec<String>,
    pub id: Option<String>,
    pub kind: StatusKind,
}

impl TestDetail {
    /// Build a detail. Message chunks are split on newlines and each line
    /// loses its trailing whitespace; an empty id is treated as absent.
    pub fn new<I, S>(message: I, id: impl Into<String>, kind: StatusKind) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let message = message
            .into_iter()
            .flat_map(|chunk| {
                chunk
                    .as_ref()
                    .split('\n')
                    .map(|line| line.trim_end().to_string())
                    .collect::<Vec<_>>()
            })
            .collect();
        let id = id.into();
        Self {
            message,
            id: if id.is_empty() { None } else { Some(id) },
            kind,
        }
    }

    /// Headline shown next to the status label
    pub fn headline(&self) -> &str {
        match &self.id {
            Some(id) => id,
            None => self.message.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// Message lines shown below the headline
    pub fn body(&self) -> &[String] {
        match &self.id {
            Some(_) => &self.message,
            None => self.message.get(1..).unwrap_or(&[]),
        }
    }
}

/// All details recorded for one test case
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestGroup {
    pub name: String,
    pub counts: StatusCounts,
    pub details: Vec<TestDetail>,
}

impl TestGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counts: StatusCounts::default(),
            details: Vec::new(),
        }
    }

    /// Group reporting a single configuration or launch error
    pub fn single_error(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut group = Self::new(name);
        group.add(StatusKind::Error, Vec::<String>::new(), reason);
        group
    }

    /// Synthetic group carrying every fault the fixture server recorded
    pub fn from_server_faults(faults: Vec<ServerFault>) -> Self {
        let mut group = Self::new(SERVER_ERRORS_GROUP);
        for fault in faults {
            group.add(StatusKind::Error, fault.context, fault.summary);
        }
        group
    }

    pub fn add<I, S>(&mut self, kind: StatusKind, message: I, id: impl Into<String>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.push(TestDetail::new(message, id, kind));
    }

    pub fn push(&mut self, detail: TestDetail) {
        self.counts.bump(detail.kind);
        self.details.push(detail);
    }

    pub fn count(&self, kind: StatusKind) -> usize {
        self.counts.get(kind)
    }

    pub fn worst(&self) -> StatusKind {
        self.counts.worst()
    }

    pub fn is_successful(&self) -> bool {
        self.counts.is_successful()
    }

    /// Cross-check the target's exit code against what was parsed so far.
    ///
    /// `program` names the target in the resulting messages.
    pub fn check_exit_code(&mut self, code: i32, program: &str) {
        let none = Vec::<String>::new();
        match code {
            0 => {
                if !self.is_successful() && self.count(StatusKind::Error) == 0 {
                    self.add(
                        StatusKind::Error,
                        none,
                        format!("{program} exited successfully when test failed"),
                    );
                }
            }
            1 | -15 => {
                if self.is_successful() {
                    self.add(
                        StatusKind::Error,
                        none,
                        format!("{program} exited unsuccessfully"),
                    );
                }
            }
            c if c >= 2 => {
                self.add(StatusKind::Error, none, format!("{program} exited with code {c}"));
            }
            c => {
                self.add(
                    StatusKind::Error,
                    none,
                    format!("{program} killed by signal {}", -c),
                );
            }
        }
    }
}

/// Status counts summed over every group of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RunTotals(StatusCounts);

impl RunTotals {
    pub fn from_groups<'a>(groups: impl IntoIterator<Item = &'a TestGroup>) -> Self {
        let mut totals = Self::default();
        for group in groups {
            totals.absorb(group);
        }
        totals
    }

    pub fn absorb(&mut self, group: &TestGroup) {
        self.0.add(&group.counts);
    }

    pub fn get(&self, kind: StatusKind) -> usize {
        self.0.get(kind)
    }

    pub fn is_successful(&self) -> bool {
        self.0.is_successful()
    }

    /// Nonzero totals in listing order
    pub fn nonzero(&self) -> impl Iterator<Item = (StatusKind, usize)> + '_ {
        StatusKind::LISTING
            .into_iter()
            .map(|kind| (kind, self.get(kind)))
            .filter(|(_, n)| *n > 0)
    }
}
