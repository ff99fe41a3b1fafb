//! Process supervisor: launch an engine, stream its output, stop it on request
//!
//! stdout and stderr are read by two forwarding tasks that split on `\r` as well as
//! `\n` (progress bars are redrawn in place) and decode with the configured charset.
//! Both feed one channel, which gives the merged-stream view the parsers expect.
//!
//! Stopping is cooperative: the [`CancellationToken`] is checked before launch, raced
//! against every line and against the final wait. A stopped engine first receives
//! `SIGTERM` (unix), then gets the grace period to exit, then is killed.

use encoding_rs::Encoding;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::command::CommandLine;
use crate::error::{Error, Result};

/// Lines buffered between the forwarding tasks and the consumer
const LINE_BUFFER: usize = 64;

/// How the consumer treats output lines
pub enum RunMode<'a> {
    /// Accumulate every line into the payload (joined with `\n`)
    Metadata,
    /// Hand every line to the callback as it arrives
    Transfer(&'a mut (dyn FnMut(&str) + Send)),
}

/// How a supervised run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// The process exited on its own
    Exited {
        /// Exit status
        status: ExitStatus,
        /// Accumulated output (metadata mode only, empty otherwise)
        payload: String,
        /// Last non-empty output line
        last_line: Option<String>,
    },
    /// The run was cancelled; the process (if any) has been terminated and reaped
    Stopped,
}

/// Launches engine processes and streams their output
#[derive(Clone, Debug)]
pub struct ProcessSupervisor {
    encoding: &'static Encoding,
    grace_period: Duration,
}

impl ProcessSupervisor {
    /// Supervisor decoding output with `encoding`, allowing `grace_period` between
    /// the termination request and the forced kill
    pub fn new(encoding: &'static Encoding, grace_period: Duration) -> Self {
        Self {
            encoding,
            grace_period,
        }
    }

    /// Output charset
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Run `command` to completion or until `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns [`Error::Launch`] if the process cannot be started, or [`Error::Io`] if
    /// waiting on it fails. A cancellation is reported as [`RunOutcome::Stopped`].
    pub async fn run(
        &self,
        command: &CommandLine,
        mut mode: RunMode<'_>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        if cancel.is_cancelled() {
            debug!(command = %command, "stop requested before launch, not starting engine");
            return Ok(RunOutcome::Stopped);
        }

        let mut child = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Launch {
                program: command.program().to_path_buf(),
                source,
            })?;
        let pid = child.id();
        info!(pid = ?pid, command = %command, "engine started");

        let (tx, mut rx) = mpsc::channel(LINE_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, self.encoding, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, self.encoding, tx.clone()));
        }
        drop(tx);

        let mut payload = String::new();
        let mut last_line: Option<String> = None;

        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                line = rx.recv() => line,
            };
            let Some(line) = line else {
                debug!(pid = ?pid, "engine output exhausted");
                break;
            };
            match &mut mode {
                RunMode::Metadata => {
                    if !payload.is_empty() {
                        payload.push('\n');
                    }
                    payload.push_str(&line);
                }
                RunMode::Transfer(on_line) => on_line(&line),
            }
            last_line = Some(line);
        }

        // output can close before the process exits, so the wait is cancellable too
        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            status = child.wait() => Some(status?),
        };

        match status {
            Some(status) => {
                info!(pid = ?pid, status = %status, "engine exited");
                Ok(RunOutcome::Exited {
                    status,
                    payload,
                    last_line,
                })
            }
            None => {
                self.terminate(&mut child).await;
                info!(pid = ?pid, "engine stopped");
                Ok(RunOutcome::Stopped)
            }
        }
    }

    async fn terminate(&self, child: &mut Child) {
        if let Ok(Some(status)) = child.try_wait() {
            debug!(status = %status, "engine already exited");
            return;
        }

        if request_termination(child) {
            match tokio::time::timeout(self.grace_period, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(status = %status, "engine exited after termination request");
                    return;
                }
                Ok(Err(e)) => warn!(error = %e, "failed to wait for engine"),
                Err(_) => {
                    warn!(grace_period = ?self.grace_period, "engine ignored termination request, killing")
                }
            }
        }

        if let Err(e) = child.kill().await {
            warn!(error = %e, "failed to kill engine");
        }
    }
}

/// Ask the process to exit; returns whether the request was delivered
#[cfg(unix)]
fn request_termination(child: &Child) -> bool {
    let Some(pid) = child.id().and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return false;
    };
    // SAFETY: This is safe because:
    // 1. kill(2) takes no pointers, only a pid and a signal number
    // 2. `child` has not been reaped yet (`id()` returned Some), so the pid still
    //    names our child and cannot have been recycled
    unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn request_termination(_child: &Child) -> bool {
    false
}

/// Read `reader` to the end, sending each decoded non-empty line to `tx`
async fn forward_lines<R>(reader: R, encoding: &'static Encoding, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut splitter = LineSplitter::default();

    loop {
        let chunk = match reader.fill_buf().await {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, "engine output stream failed");
                break;
            }
        };
        if chunk.is_empty() {
            break;
        }
        let len = chunk.len();
        let lines = splitter.push(chunk);
        reader.consume(len);

        for raw in lines {
            if let Some(line) = decode_line(&raw, encoding)
                && tx.send(line).await.is_err()
            {
                // consumer is gone (stopped run)
                return;
            }
        }
    }

    if let Some(raw) = splitter.finish()
        && let Some(line) = decode_line(&raw, encoding)
    {
        let _ = tx.send(line).await;
    }
}

/// Decode and trim one raw line; `None` if nothing is left
fn decode_line(raw: &[u8], encoding: &'static Encoding) -> Option<String> {
    let (text, _) = encoding.decode_without_bom_handling(raw);
    let line = text.trim();
    (!line.is_empty()).then(|| line.to_string())
}

/// Byte-level splitter treating `\r` and `\n` as terminators
#[derive(Debug, Default)]
pub(crate) struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    /// Feed a chunk, returning every line it completes
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\r' || byte == b'\n' {
                if !self.pending.is_empty() {
                    lines.push(std::mem::take(&mut self.pending));
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Unterminated trailing line, if any
    pub(crate) fn finish(self) -> Option<Vec<u8>> {
        (!self.pending.is_empty()).then_some(self.pending)
    }
}
