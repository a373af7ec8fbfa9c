//! Test outcome kinds and their fixed priority order

use serde::{Deserialize, Serialize};

/// Outcome of a single test detail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Pass,
    Fail,
    Xfail,
    Xpass,
    Error,
    Skip,
}

/// Terminal hue used when a status is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hue {
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
}

impl StatusKind {
    /// Number of distinct statuses
    pub const COUNT: usize = 6;

    /// Order in which "worst status" is resolved: the first kind with a
    /// nonzero count wins. SKIP deliberately outranks XFAIL.
    pub const WORST_FIRST: [StatusKind; 6] = [
        StatusKind::Error,
        StatusKind::Fail,
        StatusKind::Xpass,
        StatusKind::Skip,
        StatusKind::Xfail,
        StatusKind::Pass,
    ];

    /// Order in which run totals are listed
    pub const LISTING: [StatusKind; 6] = [
        StatusKind::Pass,
        StatusKind::Fail,
        StatusKind::Xpass,
        StatusKind::Xfail,
        StatusKind::Error,
        StatusKind::Skip,
    ];

    pub fn index(self) -> usize {
        match self {
            StatusKind::Pass => 0,
            StatusKind::Fail => 1,
            StatusKind::Xfail => 2,
            StatusKind::Xpass => 3,
            StatusKind::Error => 4,
            StatusKind::Skip => 5,
        }
    }

    pub fn hue(self) -> Hue {
        match self {
            StatusKind::Pass => Hue::Green,
            StatusKind::Fail | StatusKind::Error => Hue::Red,
            StatusKind::Xfail | StatusKind::Xpass => Hue::Yellow,
            StatusKind::Skip => Hue::Magenta,
        }
    }

    /// Whether the status is drawn in the bright/bold variant of its hue
    pub fn is_bold(self) -> bool {
        matches!(self, StatusKind::Fail | StatusKind::Xpass | StatusKind::Error)
    }

    /// One-character progress marker
    pub fn short_label(self) -> &'static str {
        match self {
            StatusKind::Pass => ".",
            StatusKind::Fail => "F",
            StatusKind::Xfail => "f",
            StatusKind::Xpass => "P",
            StatusKind::Error => "E",
            StatusKind::Skip => "s",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatusKind::Pass => "pass",
            StatusKind::Fail => "FAIL",
            StatusKind::Xfail => "xfail",
            StatusKind::Xpass => "XPASS",
            StatusKind::Error => "ERROR",
            StatusKind::Skip => "skip",
        }
    }

    pub fn long_label(self) -> &'static str {
        match self {
            StatusKind::Pass => "passed",
            StatusKind::Fail => "failed",
            StatusKind::Xfail => "failed as expected",
            StatusKind::Xpass => "passed unexpectedly",
            StatusKind::Error => "had errors",
            StatusKind::Skip => "skipped",
        }
    }

    /// Statuses that make a group unsuccessful
    pub fn is_failure(self) -> bool {
        matches!(self, StatusKind::Fail | StatusKind::Xpass | StatusKind::Error)
    }

    /// Statuses hidden from non-exhaustive reports
    pub fn is_quiet(self) -> bool {
        matches!(self, StatusKind::Pass | StatusKind::Xfail | StatusKind::Skip)
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-status counters indexed by [`StatusKind::index`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts([usize; StatusKind::COUNT]);

impl StatusCounts {
    pub fn get(&self, kind: StatusKind) -> usize {
        self.0[kind.index()]
    }

    pub fn bump(&mut self, kind: StatusKind) {
        self.0[kind.index()] += 1;
    }

    pub fn add(&mut self, other: &StatusCounts) {
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            *mine += theirs;
        }
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    /// Worst status present, PASS when nothing was counted
    pub fn worst(&self) -> StatusKind {
        StatusKind::WORST_FIRST
            .into_iter()
            .find(|kind| self.get(*kind) > 0)
            .unwrap_or(StatusKind::Pass)
    }

    /// True when no FAIL, XPASS or ERROR was counted
    pub fn is_successful(&self) -> bool {
        StatusKind::LISTING
            .into_iter()
            .filter(|kind| kind.is_failure())
            .all(|kind| self.get(kind) == 0)
    }
}

impl Serialize for StatusCounts {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        for kind in StatusKind::LISTING {
            let n = self.get(kind);
            if n > 0 {
                map.serialize_entry(&kind, &n)?;
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn counts(kinds: &[StatusKind]) -> StatusCounts {
        let mut c = StatusCounts::default();
        for k in kinds {
            c.bump(*k);
        }
        c
    }

    #[test]
    fn test_empty_counts_are_pass() {
        let c = StatusCounts::default();
        assert_eq!(c.worst(), StatusKind::Pass);
        assert!(c.is_successful());
        assert_eq!(c.total(), 0);
    }

    #[test_case(&[StatusKind::Skip, StatusKind::Xfail], StatusKind::Skip ; "skip outranks xfail")]
    #[test_case(&[StatusKind::Pass, StatusKind::Xfail], StatusKind::Xfail ; "xfail outranks pass")]
    #[test_case(&[StatusKind::Skip, StatusKind::Xpass], StatusKind::Xpass ; "xpass outranks skip")]
    #[test_case(&[StatusKind::Xpass, StatusKind::Fail], StatusKind::Fail ; "fail outranks xpass")]
    #[test_case(&[StatusKind::Fail, StatusKind::Error, StatusKind::Pass], StatusKind::Error ; "error outranks all")]
    fn test_worst_status(kinds: &[StatusKind], expected: StatusKind) {
        assert_eq!(counts(kinds).worst(), expected);
    }

    #[test_case(StatusKind::Pass, true)]
    #[test_case(StatusKind::Xfail, true)]
    #[test_case(StatusKind::Skip, true)]
    #[test_case(StatusKind::Fail, false)]
    #[test_case(StatusKind::Xpass, false)]
    #[test_case(StatusKind::Error, false)]
    fn test_success_per_status(kind: StatusKind, successful: bool) {
        assert_eq!(counts(&[kind]).is_successful(), successful);
    }

    #[test]
    fn test_add_sums_each_status() {
        let mut a = counts(&[StatusKind::Pass, StatusKind::Fail]);
        let b = counts(&[StatusKind::Pass, StatusKind::Skip]);
        a.add(&b);
        assert_eq!(a.get(StatusKind::Pass), 2);
        assert_eq!(a.get(StatusKind::Fail), 1);
        assert_eq!(a.get(StatusKind::Skip), 1);
        assert_eq!(a.total(), 4);
    }

    #[test]
    fn test_indices_are_distinct() {
        let mut seen = [false; StatusKind::COUNT];
        for kind in StatusKind::LISTING {
            assert!(!seen[kind.index()]);
            seen[kind.index()] = true;
        }
    }

    #[test]
    fn test_counts_serialize_nonzero_only() {
        let c = counts(&[StatusKind::Pass, StatusKind::Fail, StatusKind::Fail]);
        let json = serde_json::to_value(c).unwrap();
        assert_eq!(json, serde_json::json!({"pass": 1, "fail": 2}));
    }
}
