//! Subprocess harness
//!
//! Starts the target, feeds its stdin, drains stdout and stderr on separate
//! tasks so neither pipe can fill up and stall the child, and enforces the
//! time budget with a watchdog that terminates the whole process group.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

use testrig_common::{timeout_line, RunResult};

use crate::error::{RunnerError, RunnerResult};

/// How long a terminated process (and its output pipes) may linger before
/// it is killed outright
pub const KILL_GRACE: Duration = Duration::from_secs(2);

type LineSink = Arc<Mutex<Vec<String>>>;

/// One fully specified target invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,

    /// Variables set for the child
    pub envs: Vec<(String, String)>,

    /// Variables removed from the inherited environment
    pub env_remove: Vec<String>,

    /// Bytes written to stdin; stdin is not attached when empty
    pub input: Vec<u8>,

    pub timeout: Duration,

    /// Echo captured lines to our stdout as they arrive
    pub echo: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            envs: Vec::new(),
            env_remove: Vec::new(),
            input: Vec::new(),
            timeout,
            echo: false,
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for key in &self.env_remove {
            cmd.env_remove(key);
        }
        cmd.envs(self.envs.iter().map(|(k, v)| (k, v)));
        cmd
    }
}

/// Run the target to completion or until its time budget runs out
pub async fn run(invocation: &Invocation) -> RunnerResult<RunResult> {
    let mut cmd = invocation.command();
    cmd.stdin(if invocation.input.is_empty() {
        Stdio::null()
    } else {
        Stdio::piped()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    // Own process group, so the watchdog reaches grandchildren too
    #[cfg(unix)]
    cmd.process_group(0);

    debug!("running {}", invocation.command_line());

    let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
        program: invocation.program.clone(),
        source,
    })?;
    // The id is gone once the child is reaped; the group may outlive it
    let group = child.id();
    #[cfg(not(unix))]
    let _ = group;

    let writer = child.stdin.take().map(|mut stdin| {
        let input = invocation.input.clone();
        tokio::spawn(async move {
            let written = stdin.write_all(&input).await;
            drop(stdin);
            written
        })
    });

    let stdout: LineSink = Arc::default();
    let stderr: LineSink = Arc::default();
    let readers: Vec<JoinHandle<std::io::Result<()>>> = [
        child
            .stdout
            .take()
            .map(|s| tokio::spawn(drain_lines(s, stdout.clone(), invocation.echo))),
        child
            .stderr
            .take()
            .map(|s| tokio::spawn(drain_lines(s, stderr.clone(), invocation.echo))),
    ]
    .into_iter()
    .flatten()
    .collect();

    let deadline = Instant::now() + invocation.timeout;
    let waited = timeout_at(deadline, child.wait()).await;
    let (status, timed_out) = match waited {
        Ok(status) => (status?, false),
        Err(_) => {
            warn!(
                "{} exceeded {:?}, terminating",
                invocation.program, invocation.timeout
            );
            (terminate(&mut child).await?, true)
        }
    };

    if let Some(writer) = writer {
        if !writer.is_finished() {
            writer.abort();
        }
        match writer.await {
            Ok(Err(e)) => debug!("stdin write ended early: {}", e),
            Ok(Ok(())) | Err(_) => {}
        }
    }

    let drain_deadline = deadline.max(Instant::now()) + KILL_GRACE;
    let mut read_error = None;
    for mut reader in readers {
        match timeout_at(drain_deadline, &mut reader).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => read_error = Some(e),
            Ok(Err(join)) => warn!("output reader failed: {}", join),
            Err(_) => {
                warn!("output pipe still open after the process exited, killing its group");
                #[cfg(unix)]
                signal_pgid(group, nix::sys::signal::Signal::SIGKILL);
                reader.abort();
            }
        }
    }
    if let Some(e) = read_error {
        return Err(RunnerError::Io(e));
    }

    let stdout = std::mem::take(&mut *stdout.lock());
    let mut stderr = std::mem::take(&mut *stderr.lock());

    if timed_out {
        let line = timeout_line(invocation.timeout);
        if invocation.echo {
            println!("{line}");
        }
        stderr.push(line);
    }

    let exit_code = decode_status(status);
    if invocation.echo {
        if exit_code < 0 {
            println!("## killed by signal {}", -exit_code);
        } else {
            println!("## exit {exit_code}");
        }
    }

    Ok(RunResult {
        exit_code,
        stdout,
        stderr,
        timed_out,
    })
}

/// Run interactively with inherited stdio, e.g. under a debugger
pub async fn run_attached(invocation: &Invocation) -> RunnerResult<ExitStatus> {
    debug!("running attached {}", invocation.command_line());
    invocation
        .command()
        .status()
        .await
        .map_err(|source| RunnerError::Spawn {
            program: invocation.program.clone(),
            source,
        })
}

async fn drain_lines<R>(stream: R, sink: LineSink, echo: bool) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.is_empty() {
            continue;
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        if echo {
            println!("{line}");
        }
        sink.lock().push(line);
    }
}

/// SIGTERM the process group, then SIGKILL it if it is still around after
/// the grace period
async fn terminate(child: &mut Child) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::Signal;

        signal_group(child, Signal::SIGTERM);
        let waited = timeout(KILL_GRACE, child.wait()).await;
        if let Ok(status) = waited {
            return status;
        }
        warn!("process ignored SIGTERM, killing it");
        signal_group(child, Signal::SIGKILL);
    }

    child.start_kill()?;
    child.wait().await
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: nix::sys::signal::Signal) {
    signal_pgid(child.id(), signal);
}

#[cfg(unix)]
fn signal_pgid(pgid: Option<u32>, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    if let Some(pgid) = pgid {
        if let Err(e) = killpg(Pid::from_raw(pgid as i32), signal) {
            debug!("killpg({}, {:?}) failed: {}", pgid, signal, e);
        }
    }
}

fn decode_status(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}
