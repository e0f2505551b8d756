//! Helpers for running child processes with optional timeouts and bounded output.

use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Default cap on captured stdout/stderr per stream.
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// How long to wait for the output pipes to close once a timed-out command was killed.
const DRAIN_AFTER_KILL: Duration = Duration::from_millis(500);

type StreamResult = Result<(Vec<u8>, usize)>;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// Error unless the command finished in time with exit code 0.
    pub fn ensure_success(&self, label: &str) -> Result<()> {
        if self.timed_out {
            bail!("{label} timed out");
        }
        if !self.status.success() {
            return Err(anyhow!(
                "{label} failed with status {:?}: {}",
                self.status.code(),
                self.stderr_text()
            ));
        }
        Ok(())
    }

    /// Full stdout, or an error when the capture limit dropped part of it.
    pub fn complete_stdout(&self, label: &str) -> Result<&[u8]> {
        if self.stdout_truncated > 0 {
            bail!(
                "{label} output exceeded the capture limit: {} byte(s) kept, {} dropped",
                self.stdout.len(),
                self.stdout_truncated
            );
        }
        Ok(&self.stdout)
    }
}

/// Human-readable rendering of a command line for logs and errors.
pub fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().to_string()];
    parts.extend(cmd.get_args().map(|arg| arg.to_string_lossy().to_string()));
    parts.join(" ")
}

/// Run a command and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// With `timeout: None` the call blocks until the child exits. With a timeout the child runs in
/// its own process group, and the whole group is killed when the deadline passes, so helpers such
/// as `git-remote-https` or a `go test` binary cannot keep the pipes open past it.
#[instrument(skip_all, fields(command = %describe(&cmd), timeout_secs = timeout.map(|t| t.as_secs())))]
pub fn run_command(
    mut cmd: Command,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if timeout.is_some() {
        isolate_process_group(&mut cmd);
    }

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {}", describe(&cmd)));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_rx = spawn_reader(stdout, output_limit_bytes);
    let stderr_rx = spawn_reader(stderr, output_limit_bytes);

    let mut timed_out = false;
    let status = match timeout {
        None => child.wait().context("wait for command")?,
        Some(limit) => match child.wait_timeout(limit).context("wait for command")? {
            Some(status) => status,
            None => {
                warn!(timeout_secs = limit.as_secs(), "command timed out, killing");
                timed_out = true;
                kill_process_group(child.id());
                child.kill().context("kill command")?;
                child.wait().context("wait command after kill")?
            }
        },
    };

    let (stdout, stdout_truncated) =
        collect_output(&stdout_rx, timed_out).context("read stdout")?;
    let (stderr, stderr_truncated) =
        collect_output(&stderr_rx, timed_out).context("read stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn spawn_reader<R: Read + Send + 'static>(reader: R, limit: usize) -> Receiver<StreamResult> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        if tx.send(read_stream_limited(reader, limit)).is_err() {
            debug!("output reader finished after the command was abandoned");
        }
    });
    rx
}

/// Waits for a reader; after a timeout only briefly, since a surviving process may hold the pipe.
fn collect_output(rx: &Receiver<StreamResult>, timed_out: bool) -> StreamResult {
    if !timed_out {
        return rx
            .recv()
            .map_err(|_| anyhow!("output reader thread panicked"))?;
    }
    match rx.recv_timeout(DRAIN_AFTER_KILL) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!("output pipe still open after kill, discarding output");
            Ok((Vec::new(), 0))
        }
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("output reader thread panicked")),
    }
}

#[cfg(unix)]
fn isolate_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_cmd: &mut Command) {}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Sends SIGKILL to the process group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let group = format!("-{pid}");
    let result = Command::new("kill")
        .args(["-9", "--", &group])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match result {
        Ok(status) if status.success() => debug!(pid, "killed process group"),
        Ok(status) => warn!(pid, exit_code = ?status.code(), "kill process group failed"),
        Err(err) => warn!(pid, err = %err, "spawn kill for process group failed"),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_output_and_status() {
        let out = run_command(sh("printf out; printf err >&2; exit 3"), None, 1024)
            .expect("run");
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(out.stdout_text(), "out");
        assert_eq!(out.stderr_text(), "err");
        assert!(!out.timed_out);
        let err = out.ensure_success("sh").expect_err("non-zero exit");
        assert!(err.to_string().contains("err"));
    }

    #[test]
    fn truncates_beyond_limit() {
        let out = run_command(sh("printf abcdef"), None, 4).expect("run");
        assert_eq!(out.stdout, b"abcd");
        assert_eq!(out.stdout_truncated, 2);
    }

    #[test]
    fn truncated_stdout_is_not_complete() {
        let out = run_command(sh("printf abcdef"), None, 4).expect("run");
        let err = out.complete_stdout("printf").expect_err("truncated");
        assert_eq!(
            err.to_string(),
            "printf output exceeded the capture limit: 4 byte(s) kept, 2 dropped"
        );

        let out = run_command(sh("printf abcd"), None, 4).expect("run");
        assert_eq!(out.complete_stdout("printf").expect("complete"), b"abcd");
    }

    #[test]
    fn kills_on_timeout() {
        let out = run_command(sh("exec sleep 5"), Some(Duration::from_millis(100)), 1024)
            .expect("run");
        assert!(out.timed_out);
        assert!(out.ensure_success("sleep").is_err());
    }

    #[test]
    fn timeout_is_enforced_when_grandchild_holds_pipes() {
        let started = std::time::Instant::now();
        let out = run_command(sh("sleep 4; true"), Some(Duration::from_millis(200)), 1024)
            .expect("run");
        assert!(out.timed_out);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn no_timeout_still_collects_everything() {
        let out = run_command(sh("(sleep 0.2; printf late) & wait"), None, 1024).expect("run");
        assert!(out.status.success());
        assert_eq!(out.stdout_text(), "late");
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let cmd = Command::new("definitely-not-a-real-binary-for-impact");
        let err = run_command(cmd, None, 1024).expect_err("spawn fails");
        assert!(format!("{err:#}").contains("spawn"));
    }

    #[test]
    fn describe_joins_program_and_args() {
        let mut cmd = Command::new("go");
        cmd.args(["test", "-count=1", "./..."]);
        assert_eq!(describe(&cmd), "go test -count=1 ./...");
    }
}
