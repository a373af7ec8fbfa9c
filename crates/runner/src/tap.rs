//! Streaming parser for the TAP-like result protocol
//!
//! ```text
//! #message          diagnostic, attached to the next detail
//! ## comment        ignored
//! 1..N [# SKIP[: reason]]
//! (ok|not ok) [point] [description] [# TODO|# SKIP]
//! ```
//!
//! The parser starts out looking for the plan line, then consumes test
//! points until stdout ends. Stderr is only consulted once stdout is done.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use testrig_common::{StatusKind, TestGroup, TIMEOUT_PREFIX};

static DIAGNOSTIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#(#*)\s*(.*)$").unwrap());
static PLAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^1..(\d+)(?:\s*#\s*SKIP(?::\s*(.*))?)?$").unwrap());
static TEST_POINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(not ok|ok)\s*([0-9]+)?\s*([^#]*)(?:# (TODO|SKIP))?$").unwrap()
});

const GROUP_SKIPPED: &str = "Test group skipped";
const OUTPUT_IGNORED: &str = "All further output ignored";

/// A test-point line after matching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestPoint<'a> {
    pub ok: bool,
    pub point: Option<usize>,
    pub description: &'a str,
    pub directive: Option<&'a str>,
}

impl<'a> TestPoint<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        let caps = TEST_POINT.captures(line)?;
        Some(Self {
            ok: &caps[1] == "ok",
            // Too large to number anything in a plan, so out of plan
            point: caps
                .get(2)
                .map(|m| m.as_str().parse().unwrap_or(usize::MAX)),
            description: caps.get(3).map_or("", |m| m.as_str()),
            directive: caps.get(4).map(|m| m.as_str()),
        })
    }
}

/// Map a result token and directive to an outcome; `Err` carries the
/// suffix describing an unsupported combination.
pub fn outcome(ok: bool, directive: Option<&str>) -> Result<StatusKind, String> {
    match (ok, directive) {
        (true, None) => Ok(StatusKind::Pass),
        (true, Some("TODO")) => Ok(StatusKind::Xpass),
        (true, Some("SKIP")) => Ok(StatusKind::Skip),
        (true, Some(other)) => Err(format!(" [ok, with invalid directive {other}]")),
        (false, None) => Ok(StatusKind::Fail),
        (false, Some("TODO")) => Ok(StatusKind::Xfail),
        (false, Some(other)) => Err(format!(" [not ok, with invalid directive {other}]")),
    }
}

#[derive(Debug)]
enum Phase {
    SeekingPlan,
    InTestPoints {
        planned: usize,
        prev: usize,
        used: BTreeSet<usize>,
    },
    /// Terminal; anything still arriving is collected into one SKIP
    Done { ignored: Vec<String> },
}

/// Incremental protocol parser producing one [`TestGroup`]
#[derive(Debug)]
pub struct TapParser {
    group: TestGroup,
    phase: Phase,
    diagnostics: Vec<String>,
}

impl TapParser {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            group: TestGroup::new(name),
            phase: Phase::SeekingPlan,
            diagnostics: Vec::new(),
        }
    }

    /// Consume one stdout line
    pub fn feed(&mut self, line: &str) {
        if let Phase::Done { ignored } = &mut self.phase {
            ignored.push(line.to_string());
            return;
        }

        if let Some(caps) = DIAGNOSTIC.captures(line) {
            if caps[1].is_empty() {
                self.diagnostics.push(caps[2].to_string());
            }
            return;
        }

        match self.phase {
            Phase::SeekingPlan => self.seek_plan(line),
            Phase::InTestPoints { .. } => self.test_point(line),
            Phase::Done { .. } => {}
        }
    }

    fn seek_plan(&mut self, line: &str) {
        let plan = PLAN
            .captures(line)
            .and_then(|caps| Some((caps[1].parse::<usize>().ok()?, caps.get(2))));

        let Some((planned, reason)) = plan else {
            let mut message = vec![line.to_string()];
            message.append(&mut self.diagnostics);
            self.group
                .add(StatusKind::Error, message, "Plan line not interpretable");
            self.phase = Phase::Done { ignored: Vec::new() };
            return;
        };

        let has_error = self.diagnostics.iter().any(|d| d.starts_with("ERROR:"));
        let diagnostics = std::mem::take(&mut self.diagnostics);

        if planned == 0 {
            let reason = reason
                .map(|m| m.as_str())
                .filter(|r| !r.is_empty())
                .unwrap_or(GROUP_SKIPPED);
            let kind = if has_error {
                StatusKind::Error
            } else {
                StatusKind::Skip
            };
            self.group.add(kind, diagnostics, reason);
            self.phase = Phase::Done { ignored: Vec::new() };
            return;
        }

        if has_error {
            self.group.add(StatusKind::Error, diagnostics, "Before tests");
        } else if !diagnostics.is_empty() {
            self.group.add(StatusKind::Error, diagnostics, "Stray diagnostic");
        }

        self.phase = Phase::InTestPoints {
            planned,
            prev: 0,
            used: BTreeSet::new(),
        };
    }

    fn test_point(&mut self, line: &str) {
        let Phase::InTestPoints {
            planned,
            prev,
            used,
        } = &mut self.phase
        else {
            return;
        };

        let Some(tp) = TestPoint::parse(line) else {
            self.group
                .add(StatusKind::Error, [line], "neither a test nor a diagnostic");
            return;
        };

        let point = tp.point.unwrap_or(prev.saturating_add(1));
        let diagnostics = std::mem::take(&mut self.diagnostics);

        if !used.insert(point) {
            self.group.add(
                StatusKind::Error,
                diagnostics,
                format!("{} [test point repeated]", tp.description),
            );
        } else {
            // Points outside the plan cannot pass
            let ok = tp.ok && point <= *planned;
            match outcome(ok, tp.directive) {
                Ok(kind) => self.group.add(kind, diagnostics, tp.description),
                Err(suffix) => self.group.add(
                    StatusKind::Error,
                    diagnostics,
                    format!("{}{}", tp.description, suffix),
                ),
            }
        }
        *prev = point;
    }

    /// Close the stream and resolve stderr and unreported points
    pub fn finish(mut self, stderr: &[String]) -> TestGroup {
        match std::mem::replace(&mut self.phase, Phase::SeekingPlan) {
            Phase::SeekingPlan => {
                let diagnostics = std::mem::take(&mut self.diagnostics);
                self.group.add(
                    StatusKind::Error,
                    diagnostics,
                    "No plan line detected in output",
                );
            }
            Phase::Done { ignored } => {
                if !ignored.is_empty() {
                    self.group.add(StatusKind::Skip, ignored, OUTPUT_IGNORED);
                }
            }
            Phase::InTestPoints {
                planned,
                prev,
                mut used,
            } => {
                let diagnostics = std::mem::take(&mut self.diagnostics);
                match stderr {
                    [only] if only.starts_with(TIMEOUT_PREFIX) => {
                        used.insert(prev.saturating_add(1));
                        self.group.add(
                            StatusKind::Fail,
                            diagnostics,
                            &only[TIMEOUT_PREFIX.len()..],
                        );
                    }
                    [] => {}
                    _ => {
                        self.group
                            .add(StatusKind::Error, stderr, "Unexpected output on stderr");
                    }
                }

                for point in 1..=planned {
                    if !used.contains(&point) {
                        self.group.add(
                            StatusKind::Fail,
                            Vec::<String>::new(),
                            format!("test {point} did not report status"),
                        );
                    }
                }
            }
        }
        self.group
    }
}

/// Parse a complete stdout/stderr capture
pub fn parse<S: AsRef<str>>(name: &str, stdout: &[S], stderr: &[String]) -> TestGroup {
    let mut parser = TapParser::new(name);
    for line in stdout {
        parser.feed(line.as_ref());
    }
    parser.finish(stderr)
}
