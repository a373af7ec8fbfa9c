//! run-tests - Main Entry Point
//!
//! Runs the target program against every selected test script, with the
//! fixture server up for the duration of the run, and prints the report.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use testrig_cli::output::{ColorChoice, Console, JsonReport, Palette};
use testrig_fixture::{FixtureConfig, FixtureServer, HookRegistry};
use testrig_runner::{discover, discovery, Debugger, RunnerConfig, RunnerError, TestRunner};

/// Looked up in the suite base when `--config` is not given
const CONFIG_FILE: &str = "testrig.toml";

/// Run the target program against the test suite
#[derive(Parser)]
#[command(name = "run-tests")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity of logs (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Run the target under DEBUGGER (gdb, lldb or valgrind)
    #[arg(long, value_name = "DEBUGGER")]
    debugger: Option<Debugger>,

    /// Colorize the output
    #[arg(long, value_name = "WHEN", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Suite configuration file
    #[arg(long, value_name = "FILE", env = "TESTRIG_CONFIG")]
    config: Option<PathBuf>,

    /// Also write the results as JSON to FILE
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Suite base directory [default: directory of the config file, else
    /// the current directory]
    #[arg(long, value_name = "DIR")]
    base: Option<PathBuf>,

    /// Program under test [default: <base>/../bin/phantomjs]
    #[arg(long, value_name = "EXE", env = "TESTRIG_TARGET")]
    target: Option<PathBuf>,

    /// Tests to run (default: all of them)
    #[arg(value_name = "TEST")]
    tests: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let palette = Palette::detect(cli.color);

    match run(cli, palette).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            println!("{}: {}", palette.fatal(), e);
            for cause in e.chain().skip(1) {
                println!("{}", palette.note(&format!("## {cause}")));
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = if verbose >= 3 { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli, palette: Palette) -> anyhow::Result<u8> {
    let base = suite_base(cli.base.as_deref(), cli.config.as_deref())?;
    let target = cli.target.clone().unwrap_or_else(|| default_target(&base));
    if !target.is_file() {
        println!("{} is unavailable, cannot run tests.", target.display());
        return Ok(1);
    }

    let config_path = cli.config.clone().unwrap_or_else(|| base.join(CONFIG_FILE));
    let config = RunnerConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    debug!("suite base {}, target {}", base.display(), target.display());

    let mut runner = TestRunner::new(&base, &target, config)
        .verbose(cli.verbose)
        .debugger(cli.debugger);

    if cli.verbose > 0 {
        match runner.version().await {
            Ok(version) => {
                let line = format!("## Testing {} {}", runner.program_name(), version);
                println!("{}", palette.note(&line));
            }
            Err(RunnerError::VersionCheck(result)) => {
                println!("{}: Version check failed", palette.fatal());
                for line in result.stdout.iter().chain(&result.stderr) {
                    println!("{}", palette.note(&format!("## {line}")));
                }
                println!("{}", palette.note(&format!("## exit {}", result.exit_code)));
                return Ok(1);
            }
            Err(e) => return Err(e.into()),
        }
    }

    let cases = discovery::filter(discover(&base, &runner.config().patterns)?, &cli.tests);
    debug!("{} test(s) selected", cases.len());

    let server = if runner.config().fixture_server {
        let fixture = FixtureConfig {
            www_root: runner.config().www_path(&base),
            certs_dir: runner.config().certs_path(&base),
            echo: cli.verbose >= 3,
        };
        let server = FixtureServer::start(fixture, HookRegistry::with_builtins(), runner.faults())
            .await
            .context("starting fixture server")?;
        if cli.verbose >= 3 {
            println!("## HTTP server at {}", server.http_base());
            println!("## HTTPS server at {}", server.https_base());
        }
        runner = runner.fixture_bases(server.http_base(), server.https_base());
        Some(server)
    } else {
        None
    };

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for interrupts: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let mut console = Console::new(io::stdout(), palette, cli.verbose);
    let outcome = runner.run_tests(&cases, &mut console, interrupt).await;

    if let Some(server) = server {
        server.shutdown().await;
    }

    console.end_progress()?;
    if outcome.tests_run == 0 && !outcome.interrupted {
        eprintln!("No tests selected for execution.");
    } else {
        console.finish(&outcome)?;
    }

    if let Some(path) = &cli.json {
        let report = JsonReport::new(target.display().to_string(), &outcome);
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(u8::try_from(outcome.exit_code()).unwrap_or(1))
}

fn suite_base(base: Option<&Path>, config: Option<&Path>) -> anyhow::Result<PathBuf> {
    let base = match (base, config.and_then(Path::parent)) {
        (Some(base), _) => base.to_path_buf(),
        (None, Some(dir)) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => std::env::current_dir().context("reading current directory")?,
    };
    Ok(std::fs::canonicalize(&base).unwrap_or(base))
}

fn default_target(base: &Path) -> PathBuf {
    let exe = if cfg!(windows) { "phantomjs.exe" } else { "phantomjs" };
    base.parent().unwrap_or(base).join("bin").join(exe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_flags_and_filters() {
        let cli = Cli::parse_from([
            "run-tests", "-vvv", "--color", "never", "--debugger", "gdb", "basics", "module/fs",
        ]);
        assert_eq!(cli.verbose, 3);
        assert_eq!(cli.color, ColorChoice::Never);
        assert_eq!(cli.debugger, Some(Debugger::Gdb));
        assert_eq!(cli.tests, vec!["basics", "module/fs"]);
    }

    #[test]
    fn test_cli_rejects_unknown_debugger() {
        assert!(Cli::try_parse_from(["run-tests", "--debugger", "windbg"]).is_err());
    }

    #[test]
    fn test_base_follows_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join(CONFIG_FILE);
        let base = suite_base(None, Some(&config)).unwrap();
        assert_eq!(base, std::fs::canonicalize(dir.path()).unwrap());

        let explicit = suite_base(Some(Path::new("/nonexistent/suite")), Some(&config)).unwrap();
        assert_eq!(explicit, PathBuf::from("/nonexistent/suite"));
    }

    #[test]
    fn test_default_target_is_beside_the_suite() {
        let exe = if cfg!(windows) { "phantomjs.exe" } else { "phantomjs" };
        assert_eq!(
            default_target(Path::new("/src/test")),
            Path::new("/src/bin").join(exe)
        );
    }
}
