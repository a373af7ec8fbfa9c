//! Run aggregator: executes every discovered test case in order

use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use testrig_common::{FaultLog, RunDescriptor, RunResult, RunTotals, TestGroup};

use crate::classify::Classifier;
use crate::config::RunnerConfig;
use crate::directive;
use crate::discovery::TestCase;
use crate::error::{RunnerError, RunnerResult};
use crate::harness::{self, Invocation};

/// Debuggers the target can be started under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Debugger {
    Gdb,
    Lldb,
    Valgrind,
}

impl Debugger {
    fn prefix(self) -> &'static [&'static str] {
        match self {
            Self::Gdb => &["gdb", "--args"],
            Self::Lldb => &["lldb", "--"],
            Self::Valgrind => &["valgrind"],
        }
    }
}

impl FromStr for Debugger {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gdb" => Ok(Self::Gdb),
            "lldb" => Ok(Self::Lldb),
            "valgrind" => Ok(Self::Valgrind),
            other => Err(RunnerError::UnknownDebugger(other.to_string())),
        }
    }
}

/// Receives progress as the run goes
pub trait Reporter {
    fn test_started(&mut self, _case: &TestCase) {}

    fn group_finished(&mut self, group: &TestGroup);
}

/// Everything a finished (or interrupted) run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Groups in execution order; the server-fault group is always last
    pub groups: Vec<TestGroup>,
    pub totals: RunTotals,
    pub tests_run: usize,
    pub elapsed: Duration,
    pub interrupted: bool,
}

impl RunOutcome {
    /// 2 when interrupted, 1 when nothing ran or anything failed, else 0
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            2
        } else if self.tests_run == 0 || !self.totals.is_successful() {
            1
        } else {
            0
        }
    }
}

/// Drives the target program through a suite of test scripts
pub struct TestRunner {
    base: PathBuf,
    target: PathBuf,
    config: RunnerConfig,
    verbose: u8,
    debugger: Option<Debugger>,
    fixture_bases: Option<(String, String)>,
    faults: FaultLog,
    env_remove: Vec<String>,
}

impl TestRunner {
    pub fn new(base: impl Into<PathBuf>, target: impl Into<PathBuf>, config: RunnerConfig) -> Self {
        // Locale variables are dropped so the target runs in the C locale
        let env_remove = std::env::vars_os()
            .filter_map(|(key, _)| key.into_string().ok())
            .filter(|key| key.starts_with("LC_") || key.starts_with("LANG"))
            .collect();

        Self {
            base: base.into(),
            target: target.into(),
            config,
            verbose: 0,
            debugger: None,
            fixture_bases: None,
            faults: FaultLog::new(),
            env_remove,
        }
    }

    pub fn verbose(mut self, level: u8) -> Self {
        self.verbose = level;
        self
    }

    pub fn debugger(mut self, debugger: Option<Debugger>) -> Self {
        self.debugger = debugger;
        self
    }

    /// Base URLs of a running fixture server, passed to the target as
    /// `TEST_HTTP_BASE` and `TEST_HTTPS_BASE`
    pub fn fixture_bases(mut self, http: impl Into<String>, https: impl Into<String>) -> Self {
        self.fixture_bases = Some((http.into(), https.into()));
        self
    }

    /// Collector the fixture server records its faults into
    pub fn faults(&self) -> FaultLog {
        self.faults.clone()
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Name of the target used in exit-code messages
    pub fn program_name(&self) -> String {
        self.target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.target.display().to_string())
    }

    /// Run every case in order, stopping early if `interrupt` resolves.
    ///
    /// A case in flight when the interrupt arrives is abandoned and its
    /// process killed; groups already finished are kept.
    pub async fn run_tests<F>(
        &self,
        cases: &[TestCase],
        reporter: &mut dyn Reporter,
        interrupt: F,
    ) -> RunOutcome
    where
        F: Future<Output = ()>,
    {
        let start = Instant::now();
        let mut groups = Vec::with_capacity(cases.len() + 1);
        let mut interrupted = false;
        tokio::pin!(interrupt);

        info!("running {} test(s)", cases.len());

        for case in cases {
            reporter.test_started(case);
            let group = tokio::select! {
                biased;
                _ = &mut interrupt => {
                    warn!("interrupted during {}", case.name);
                    interrupted = true;
                    break;
                }
                group = self.run_test(case) => group,
            };
            reporter.group_finished(&group);
            groups.push(group);
        }
        let tests_run = groups.len();

        let faults = self.faults.drain();
        if !faults.is_empty() {
            warn!("fixture server recorded {} fault(s)", faults.len());
        }
        let server_group = TestGroup::from_server_faults(faults);
        reporter.group_finished(&server_group);
        groups.push(server_group);

        RunOutcome {
            totals: RunTotals::from_groups(&groups),
            groups,
            tests_run,
            elapsed: start.elapsed(),
            interrupted,
        }
    }

    /// Execute one case and classify the result; never fails, errors are
    /// recorded in the returned group
    pub async fn run_test(&self, case: &TestCase) -> TestGroup {
        let defaults = RunDescriptor {
            timeout: self.config.default_timeout(),
            ..Default::default()
        };
        let descriptor = match directive::parse_file(&case.path, defaults) {
            Ok(d) => d,
            Err(e) => {
                let reason = match &e {
                    RunnerError::ReadScript { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                debug!("{}: configuration error: {}", case.name, reason);
                return TestGroup::single_error(
                    &case.name,
                    format!("{} ({}): {}", case.name, case.path.display(), reason),
                );
            }
        };

        let (script, script_args, target_args) = self.arguments(&case.path, &descriptor);
        let request = TargetRun {
            script,
            script_args,
            target_args,
            input: descriptor.input.clone(),
            timeout: descriptor.timeout,
            silent: false,
        };

        match self.run_target(request).await {
            Ok(result) => Classifier::for_descriptor(&descriptor).classify(
                &case.name,
                &self.program_name(),
                &result,
            ),
            Err(e) => TestGroup::single_error(&case.name, e.to_string()),
        }
    }

    /// Ask the target for its version; anything but a single line on
    /// stdout and a clean exit is a failure
    pub async fn version(&self) -> RunnerResult<String> {
        let result = self
            .run_target(TargetRun {
                script: "--version".to_string(),
                script_args: Vec::new(),
                target_args: Vec::new(),
                input: Vec::new(),
                timeout: self.config.default_timeout(),
                silent: true,
            })
            .await?;

        match result.stdout.as_slice() {
            [version] if result.exit_code == 0 && result.stderr.is_empty() => Ok(version.clone()),
            _ => Err(RunnerError::VersionCheck(result)),
        }
    }

    /// Script, script arguments and target arguments for one case
    fn arguments(&self, path: &Path, d: &RunDescriptor) -> (String, Vec<String>, Vec<String>) {
        let mut script_args = d.script_args.clone();
        let mut target_args = d.target_args.clone();

        let script = if d.use_harness {
            script_args.insert(0, path.display().to_string());
            self.config.harness_path(&self.base).display().to_string()
        } else {
            path.display().to_string()
        };

        if d.use_certificates {
            target_args.insert(
                0,
                format!(
                    "--ssl-certificates-path={}",
                    self.config.certs_path(&self.base).display()
                ),
            );
        }

        (script, script_args, target_args)
    }

    /// Full argument vector: debugger prefix, target, target arguments,
    /// script, verbosity flag, script arguments
    fn command(&self, run: &TargetRun, verbose: u8, debugger: Option<Debugger>) -> Vec<String> {
        let mut argv: Vec<String> = debugger
            .map(|d| d.prefix().iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();
        argv.push(self.target.display().to_string());
        argv.extend(run.target_args.iter().cloned());
        argv.push(run.script.clone());
        if verbose > 0 {
            argv.push(format!("--verbose={verbose}"));
        }
        argv.extend(run.script_args.iter().cloned());
        argv
    }

    fn environment(&self) -> Vec<(String, String)> {
        let target = self.target.display().to_string();
        let mut envs = vec![
            ("TEST_DIR".to_string(), self.base.display().to_string()),
            ("PHANTOMJS".to_string(), target.clone()),
            ("TARGET".to_string(), target),
            ("LANG".to_string(), "C".to_string()),
            ("TZ".to_string(), self.config.timezone.clone()),
        ];
        if let Some((http, https)) = &self.fixture_bases {
            envs.push(("TEST_HTTP_BASE".to_string(), http.clone()));
            envs.push(("TEST_HTTPS_BASE".to_string(), https.clone()));
        }
        envs
    }

    async fn run_target(&self, run: TargetRun) -> RunnerResult<RunResult> {
        let (verbose, debugger) = if run.silent {
            (0, None)
        } else {
            (self.verbose, self.debugger)
        };

        let mut argv = self.command(&run, verbose, debugger).into_iter();
        let program = argv.next().unwrap_or_default();
        let mut invocation = Invocation::new(program, argv.collect(), run.timeout);
        invocation.envs = self.environment();
        invocation.env_remove = self.env_remove.clone();
        invocation.input = run.input;
        invocation.echo = verbose >= 3;

        if verbose >= 3 {
            println!("## running {}", invocation.command_line());
        }

        if debugger.is_some() {
            let status = harness::run_attached(&invocation).await?;
            debug!("debugger session ended with {}", status);
            return Ok(RunResult::default());
        }

        harness::run(&invocation).await
    }
}

/// One target invocation before the runner's own settings are applied
struct TargetRun {
    script: String,
    script_args: Vec<String>,
    target_args: Vec<String>,
    input: Vec<u8>,
    timeout: Duration,
    silent: bool,
}
