//! Crash-isolated execution of table extraction.
//!
//! Table detection is the one routine expected to sometimes hang or crash
//! outright, so it can run in a fresh child process: a re-exec of this
//! binary in its hidden `table-worker` mode (a clean-slate spawn, never a
//! fork of loaded state). The parent recovers a structured result or a typed
//! failure across the process boundary and enforces a hard wall-clock
//! timeout. Cancellation always degrades to process termination, never to
//! blocking forever.

mod protocol;
mod worker;

pub use protocol::{ErrorDescriptor, TableJob, WireTable, WorkerMessage};
pub use worker::run_table_worker;

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::models::TableRecord;

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

/// How often the parent polls for a result between liveness checks.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a terminated child gets to exit before it is force-killed.
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Worker execution failures. These always propagate to the caller: there is
/// no safe fallback for "the isolated computation did not produce a
/// trustworthy result", and none of them is retried automatically.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The child died from a memory-access violation before writing a result.
    #[error("table worker crashed with signal {signal} on {file}")]
    Crashed { signal: i32, file: PathBuf },

    /// The child exited without a result, but not from a segfault.
    #[error("table worker died unexpectedly (exit code {exit_code:?}, signal {signal:?}) on {file}")]
    DiedUnexpectedly {
        exit_code: Option<i32>,
        signal: Option<i32>,
        file: PathBuf,
    },

    /// No result within the configured timeout; the child has been torn down.
    #[error("table worker timed out after {timeout_secs}s on {file}")]
    TimedOut { timeout_secs: u64, file: PathBuf },

    /// The child ran its own error handler and reported a structured failure.
    /// The child's stack trace rides along as context; it is only meaningful
    /// as text, since the process it describes no longer exists.
    #[error("table worker reported failure ({kind}) on {file}: {message}")]
    ReportedFailure {
        kind: String,
        message: String,
        trace: String,
        file: PathBuf,
    },

    /// The worker process could not be spawned or polled.
    #[error("failed to run table worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// The child violated the one-message protocol (e.g. exited cleanly
    /// without writing anything, or wrote an undecodable payload).
    #[error("table worker protocol violation: {0}")]
    Protocol(String),
}

/// Spawns and supervises table-worker child processes.
#[derive(Debug, Clone)]
pub struct IsolatedExecutor {
    program: PathBuf,
    args: Vec<String>,
    poll_interval: Duration,
    grace_period: Duration,
}

impl Default for IsolatedExecutor {
    fn default() -> Self {
        let program = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("textmill"));
        Self {
            program,
            args: vec!["table-worker".to_string()],
            poll_interval: DEFAULT_POLL_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl IsolatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit worker command instead of re-execing this binary.
    /// Tests use this to stand in crash/timeout behavior.
    pub fn with_command(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            ..Self::default()
        }
    }

    /// Override the poll interval (mainly for tests).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the termination grace period.
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Run one job in a fresh child process, blocking until a result, a
    /// typed failure, or the timeout. The child is torn down on every exit
    /// path.
    pub fn run(&self, job: &TableJob, timeout: Duration) -> Result<Vec<TableRecord>, WorkerError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let mut child = ChildGuard { child };

        // Hand over the job and close stdin. A write error here means the
        // child is already gone; the poll loop below classifies that death.
        if let Some(mut stdin) = child.child.stdin.take() {
            if let Err(e) = serde_json::to_writer(&mut stdin, job) {
                tracing::debug!("failed to write job to worker stdin: {}", e);
            }
        }

        let stdout = match child.child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                self.terminate(&mut child);
                return Err(WorkerError::Protocol(
                    "worker stdout unavailable".to_string(),
                ));
            }
        };

        // The reader thread drains stdout to EOF and sends the one parsed
        // message (or None). EOF follows child death immediately, so the
        // channel doubles as the death notification.
        let (tx, rx) = mpsc::channel();
        let reader = thread::spawn(move || {
            let _ = tx.send(read_message(stdout));
        });

        let start = Instant::now();
        let message = loop {
            match rx.recv_timeout(self.poll_interval) {
                Ok(message) => break message,
                Err(RecvTimeoutError::Timeout) => {
                    if start.elapsed() >= timeout {
                        self.terminate(&mut child);
                        let _ = reader.join();
                        return Err(WorkerError::TimedOut {
                            timeout_secs: timeout.as_secs(),
                            file: job.file_path.clone(),
                        });
                    }
                    // Liveness check: a dead child has closed stdout, so the
                    // reader reports on the next turn. Polling here just
                    // reaps early and keeps the loop honest about exits.
                    if let Err(e) = child.child.try_wait() {
                        tracing::debug!("worker try_wait failed: {}", e);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break None,
            }
        };
        let _ = reader.join();

        match message {
            Some(WorkerMessage::Ok { tables }) => {
                self.terminate(&mut child);
                let mut records = Vec::with_capacity(tables.len());
                for table in tables {
                    records.push(table.into_record().map_err(WorkerError::Protocol)?);
                }
                Ok(records)
            }
            Some(WorkerMessage::Error { error }) => {
                self.terminate(&mut child);
                Err(WorkerError::ReportedFailure {
                    kind: error.kind,
                    message: error.message,
                    trace: error.trace,
                    file: job.file_path.clone(),
                })
            }
            None => self.classify_silent_death(&mut child, job, start, timeout),
        }
    }

    /// Async shape: the blocking supervision loop runs on the runtime's
    /// blocking thread pool, so the event loop is never busy-polled.
    pub async fn run_async(
        &self,
        job: TableJob,
        timeout: Duration,
    ) -> Result<Vec<TableRecord>, WorkerError> {
        let executor = self.clone();
        tokio::task::spawn_blocking(move || executor.run(&job, timeout))
            .await
            .map_err(|e| WorkerError::Protocol(format!("worker supervision task failed: {}", e)))?
    }

    /// The child closed stdout without a message. Wait (bounded) for its
    /// exit status and classify: segfault, clean-exit protocol violation,
    /// or other unexpected death.
    fn classify_silent_death(
        &self,
        child: &mut ChildGuard,
        job: &TableJob,
        start: Instant,
        timeout: Duration,
    ) -> Result<Vec<TableRecord>, WorkerError> {
        let status = loop {
            match child.child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    // stdout closed but the process lives on; the timeout
                    // still bounds it.
                    if start.elapsed() >= timeout {
                        self.terminate(child);
                        return Err(WorkerError::TimedOut {
                            timeout_secs: timeout.as_secs(),
                            file: job.file_path.clone(),
                        });
                    }
                    thread::sleep(self.poll_interval);
                }
                Err(e) => {
                    self.terminate(child);
                    return Err(e.into());
                }
            }
        };

        #[cfg(unix)]
        if let Some(signal) = status.signal() {
            if signal == libc::SIGSEGV {
                return Err(WorkerError::Crashed {
                    signal,
                    file: job.file_path.clone(),
                });
            }
            return Err(WorkerError::DiedUnexpectedly {
                exit_code: status.code(),
                signal: Some(signal),
                file: job.file_path.clone(),
            });
        }

        if status.success() {
            return Err(WorkerError::Protocol(
                "worker exited cleanly without a result message".to_string(),
            ));
        }
        Err(WorkerError::DiedUnexpectedly {
            exit_code: status.code(),
            signal: None,
            file: job.file_path.clone(),
        })
    }

    /// Tear the child down: graceful terminate, wait out the grace period,
    /// then force-kill. Safe to call on an already-dead child.
    fn terminate(&self, child: &mut ChildGuard) {
        match child.child.try_wait() {
            Ok(Some(_)) => return, // already exited and reaped
            Ok(None) => {}
            Err(e) => {
                tracing::debug!("worker try_wait during teardown failed: {}", e);
            }
        }

        #[cfg(unix)]
        unsafe {
            libc::kill(child.child.id() as i32, libc::SIGTERM);
        }

        let deadline = Instant::now() + self.grace_period;
        while Instant::now() < deadline {
            match child.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => thread::sleep(Duration::from_millis(50)),
                Err(_) => break,
            }
        }

        if let Err(e) = child.child.kill() {
            tracing::debug!("worker force-kill failed: {}", e);
        }
        let _ = child.child.wait();
    }
}

/// Last-resort cleanup if supervision unwinds: force-kill and reap so no
/// orphaned worker outlives its parent's call.
struct ChildGuard {
    child: Child,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Drain the worker's stdout and parse the last non-empty line as the one
/// result message.
fn read_message(mut stdout: impl Read) -> Option<WorkerMessage> {
    let mut buf = String::new();
    if let Err(e) = stdout.read_to_string(&mut buf) {
        tracing::debug!("failed to read worker stdout: {}", e);
        return None;
    }
    let line = buf.lines().rev().find(|l| !l.trim().is_empty())?;
    match serde_json::from_str(line) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::debug!("undecodable worker message: {} ({})", e, line);
            None
        }
    }
}
