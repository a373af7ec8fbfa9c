//! End-to-end runs of the `run-tests` binary with /bin/sh as the target

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const SHELL_HEADER: &str = "//! no-harness no-snakeoil\n\
                            //! phantomjs: -c 'eval \"$(grep -v ^//! \"$0\")\"'\n";

fn write_case(base: &Path, rel: &str, body: &str) {
    let path = base.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("{SHELL_HEADER}{body}\n")).unwrap();
}

fn run_tests(base: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_run-tests"))
        .arg("--base")
        .arg(base)
        .args(["--target", "/bin/sh", "--color", "never"])
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_passing_suite_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    write_case(dir.path(), "basics/one.js", "echo 1..1; echo ok 1 first");
    write_case(
        dir.path(),
        "regression/fixture.js",
        "echo 1..1; case \"$TEST_HTTP_BASE\" in http://localhost:*) echo ok 1;; *) echo not ok 1;; esac",
    );

    let output = run_tests(dir.path(), &[]);
    let text = stdout(&output);
    assert_eq!(output.status.code(), Some(0), "{text}");
    assert!(text.starts_with("...\n"), "{text}");
    assert!(text.contains("s elapsed\n"));
    assert!(text.ends_with("    2 passed\n"), "{text}");
}

#[test]
fn test_failures_are_reported_and_exit_one() {
    let dir = tempfile::tempdir().unwrap();
    write_case(dir.path(), "basics/good.js", "echo 1..1; echo ok 1");
    write_case(
        dir.path(),
        "basics/bad.js",
        "echo 1..1; echo 'not ok 1 broken thing'; exit 1",
    );

    let json = dir.path().join("results.json");
    let output = run_tests(dir.path(), &["--json", json.to_str().unwrap()]);
    let text = stdout(&output);
    assert_eq!(output.status.code(), Some(1), "{text}");
    assert!(text.starts_with("F..\n"), "{text}");
    assert!(text.contains("basics/bad: FAIL\n FAIL: broken thing\n"), "{text}");
    assert!(text.contains("    1 passed\n    1 failed\n"), "{text}");

    let report: serde_json::Value = serde_json::from_slice(&fs::read(json).unwrap()).unwrap();
    assert_eq!(report["tests_run"], 2);
    assert_eq!(report["exit_code"], 1);
    assert_eq!(report["groups"][2]["name"], "HTTP server errors");
}

#[test]
fn test_filters_select_by_name() {
    let dir = tempfile::tempdir().unwrap();
    write_case(dir.path(), "basics/alpha.js", "echo 1..1; echo ok 1");
    write_case(dir.path(), "basics/beta.js", "echo 1..1; echo not ok 1; exit 1");

    let json = dir.path().join("results.json");
    let output = run_tests(dir.path(), &["--json", json.to_str().unwrap(), "alpha"]);
    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));

    let report: serde_json::Value = serde_json::from_slice(&fs::read(json).unwrap()).unwrap();
    let names: Vec<_> = report["groups"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["basics/alpha", "HTTP server errors"]);
}

#[test]
fn test_nothing_selected() {
    let dir = tempfile::tempdir().unwrap();
    write_case(dir.path(), "basics/alpha.js", "echo 1..1; echo ok 1");

    let output = run_tests(dir.path(), &["no-such-test"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        String::from_utf8_lossy(&output.stderr),
        "No tests selected for execution.\n"
    );
}

#[test]
fn test_missing_target() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_run-tests"))
        .arg("--base")
        .arg(dir.path())
        .args(["--target", "/nonexistent/phantomjs"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        stdout(&output),
        "/nonexistent/phantomjs is unavailable, cannot run tests.\n"
    );
}

#[test]
fn test_invalid_config_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("testrig.toml");
    fs::write(&config, "timeout_secs = -1\n").unwrap();

    let output = run_tests(dir.path(), &[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).starts_with("FATAL: loading "), "{}", stdout(&output));
}
