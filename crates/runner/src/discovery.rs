//! Test discovery

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::{RunnerError, RunnerResult};

/// Patterns searched when the configuration names none
pub const DEFAULT_PATTERNS: &[&str] = &[
    "basics/*.js",
    "module/*/*.js",
    "standards/*/*.js",
    "regression/*.js",
];

/// A discovered test script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Path relative to the suite base, extension removed, `/`-separated
    pub name: String,
    pub path: PathBuf,
}

/// Find the scripts under `base` matching `patterns`.
///
/// Each pattern's matches are sorted; patterns are processed in order and a
/// script matched by more than one pattern is listed once. Hidden files and
/// directories are never matched.
pub fn discover(base: &Path, patterns: &[String]) -> RunnerResult<Vec<TestCase>> {
    let mut cases: Vec<TestCase> = Vec::new();

    for pattern in patterns {
        let matcher = glob_regex(pattern)?;
        let depth = pattern.split('/').count();

        let mut matched: Vec<TestCase> = WalkDir::new(base)
            .min_depth(depth)
            .max_depth(depth)
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let rel = relative_name(base, e.path())?;
                matcher.is_match(&rel).then(|| TestCase {
                    name: strip_extension(&rel).to_string(),
                    path: e.into_path(),
                })
            })
            .collect();
        matched.sort_by(|a, b| a.path.cmp(&b.path));
        debug!("pattern {} matched {} scripts", pattern, matched.len());

        for case in matched {
            if !cases.iter().any(|c| c.path == case.path) {
                cases.push(case);
            }
        }
    }

    Ok(cases)
}

/// Keep the cases whose name contains at least one filter; no filters keeps
/// everything
pub fn filter(cases: Vec<TestCase>, filters: &[String]) -> Vec<TestCase> {
    if filters.is_empty() {
        return cases;
    }
    cases
        .into_iter()
        .filter(|c| filters.iter().any(|f| c.name.contains(f.as_str())))
        .collect()
}

fn relative_name(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

fn strip_extension(rel: &str) -> &str {
    let file_start = rel.rfind('/').map_or(0, |i| i + 1);
    match rel[file_start..].rfind('.') {
        Some(dot) if dot > 0 => &rel[..file_start + dot],
        _ => rel,
    }
}

/// Translate a path glob into an anchored regex; `*` and `?` never match `/`
fn glob_regex(pattern: &str) -> RunnerResult<Regex> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');

    Regex::new(&re).map_err(|source| RunnerError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map_or(false, |name| name.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use test_case::test_case;

    fn touch(base: &Path, rel: &str) {
        let path = base.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    fn patterns(p: &[&str]) -> Vec<String> {
        p.iter().map(|s| s.to_string()).collect()
    }

    #[test_case("basics/*.js", "basics/url.js", true)]
    #[test_case("basics/*.js", "basics/sub/url.js", false)]
    #[test_case("basics/*.js", "basics/url.jsx", false)]
    #[test_case("module/*/*.js", "module/fs/open.js", true)]
    #[test_case("a?c/x.js", "abc/x.js", true)]
    #[test_case("a?c/x.js", "a/c/x.js", false)]
    fn test_glob_regex(pattern: &str, path: &str, expected: bool) {
        assert_eq!(glob_regex(pattern).unwrap().is_match(path), expected);
    }

    #[test]
    fn test_discover_orders_by_pattern_then_name() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        touch(base, "regression/issue-2.js");
        touch(base, "basics/zeta.js");
        touch(base, "basics/alpha.js");
        touch(base, "module/fs/open.js");
        touch(base, "basics/readme.txt");
        touch(base, "lib/testharness.js");
        touch(base, "basics/.hidden.js");

        let cases = discover(
            base,
            &patterns(&["basics/*.js", "module/*/*.js", "regression/*.js"]),
        )
        .unwrap();
        let names: Vec<_> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["basics/alpha", "basics/zeta", "module/fs/open", "regression/issue-2"]
        );
        assert_eq!(cases[0].path, base.join("basics/alpha.js"));
    }

    #[test]
    fn test_overlapping_patterns_list_once() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "basics/a.js");
        let cases = discover(dir.path(), &patterns(&["basics/*.js", "basics/a.*"])).unwrap();
        assert_eq!(cases.len(), 1);
    }

    #[test]
    fn test_filter_by_substring() {
        let cases = vec![
            TestCase { name: "basics/url".into(), path: "a".into() },
            TestCase { name: "module/fs/open".into(), path: "b".into() },
            TestCase { name: "regression/issue-2".into(), path: "c".into() },
        ];
        let kept = filter(cases.clone(), &patterns(&["fs", "issue"]));
        assert_eq!(kept.len(), 2);
        assert_eq!(filter(cases, &[]).len(), 3);
    }

    #[test_case("basics/url.js", "basics/url")]
    #[test_case("a.b/c", "a.b/c")]
    #[test_case("x/.rc", "x/.rc")]
    fn test_strip_extension(rel: &str, expected: &str) {
        assert_eq!(strip_extension(rel), expected);
    }
}
