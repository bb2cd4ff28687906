//! Async child processes with a timeout and bounded output.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        if self.stdout_truncated > 0 {
            text.push_str(&format!("\n[stdout truncated {} bytes]\n", self.stdout_truncated));
        }
        text
    }

    pub fn stderr_lossy(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        if self.stderr_truncated > 0 {
            text.push_str(&format!("\n[stderr truncated {} bytes]\n", self.stderr_truncated));
        }
        text
    }
}

/// Run `cmd`, draining stdout and stderr concurrently.
///
/// At most `output_limit_bytes` of each stream is kept; the rest is read and
/// discarded so the child never blocks on a full pipe. On timeout the child
/// is killed and `timed_out` is set.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub async fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("spawning child process");
    let mut child = cmd.spawn().context("spawn command")?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_task = tokio::spawn(read_stream_limited(stdout, output_limit_bytes));
    let stderr_task = tokio::spawn(read_stream_limited(stderr, output_limit_bytes));

    let waited = tokio::time::timeout(timeout, child.wait()).await;
    let (exit_code, timed_out) = match waited {
        Ok(status) => (status.context("wait for command")?.code(), false),
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            child.kill().await.context("kill command")?;
            (None, true)
        }
    };

    let (stdout, stdout_truncated) = join_reader(stdout_task, timed_out).await?;
    let (stderr, stderr_truncated) = join_reader(stderr_task, timed_out).await?;
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(?exit_code, timed_out, "command finished");
    Ok(CommandOutput {
        exit_code,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Grace period for pipe readers after a timeout kill.
///
/// Grandchildren that inherited the pipes can keep them open past the kill.
const READER_GRACE: Duration = Duration::from_secs(1);

async fn join_reader(
    task: tokio::task::JoinHandle<Result<(Vec<u8>, usize)>>,
    timed_out: bool,
) -> Result<(Vec<u8>, usize)> {
    if !timed_out {
        return task.await.context("join output reader")?;
    }
    let abort = task.abort_handle();
    match tokio::time::timeout(READER_GRACE, task).await {
        Ok(joined) => joined.context("join output reader")?,
        Err(_) => {
            abort.abort();
            warn!("output reader still open after kill, discarding");
            Ok((Vec::new(), 0))
        }
    }
}

async fn read_stream_limited<R: AsyncRead + Unpin>(
    mut reader: R,
    limit: usize,
) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).await.context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        let keep = n.min(remaining);
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }

    Ok((buf, truncated))
}
