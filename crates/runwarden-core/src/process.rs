use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tracing::debug;

use crate::ProcessError;

/// Operating system identifier of a spawned child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId {
    fn from(pid: u32) -> Self {
        ProcessId(pid)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an observed child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitReport {
    pub code: Option<i32>,
    /// Terminating signal (Unix only)
    pub signal: Option<i32>,
}

impl ExitReport {
    /// Report for a process that disappeared without us reaping it.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitReport {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Result of a process termination operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationResult {
    /// The request was delivered
    Success,
    /// Process was not found (already exited)
    ProcessNotFound,
    /// Permission denied (insufficient privileges)
    AccessDenied,
    /// Operation failed with specific error message
    Failed(String),
}

/// Answer of an operating system process-table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessPresence {
    Alive,
    Gone,
    /// The platform has no process table to consult
    Unsupported,
}

/// Everything a platform needs to launch one program.
#[derive(Debug, Clone, Copy)]
pub struct SpawnRequest<'a> {
    /// Program name, used for log attribution of the child's output
    pub program: &'a str,
    pub command: &'a Path,
    pub args: &'a [String],
    pub working_dir: &'a Path,
}

/// Trait representing a handle to a spawned child process
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Get the process ID (None once the process has been reaped)
    fn get_pid(&self) -> Option<ProcessId>;

    /// Try to get the exit status without blocking
    fn try_wait(&mut self) -> Result<Option<ExitReport>, ProcessError>;

    /// Wait for the process to exit
    async fn wait(&mut self) -> Result<ExitReport, ProcessError>;
}

/// Spawning and waiting, the half of a platform that does not send signals
#[async_trait]
pub trait ProcessLifecycle: Send + Sync {
    /// The type of process handle this lifecycle manager produces
    type Handle: ProcessHandle + 'static;

    /// Spawn a child in its own process group with piped output
    async fn spawn_process(&self, request: &SpawnRequest<'_>)
    -> Result<Self::Handle, ProcessError>;

    /// Wait for a process to exit. With a timeout, `Ok(None)` means the
    /// process was still alive when it elapsed.
    async fn wait_for_exit(
        &self,
        handle: &mut Self::Handle,
        timeout: Option<Duration>,
    ) -> Result<Option<ExitReport>, ProcessError> {
        match timeout {
            Some(duration) => match tokio::time::timeout(duration, handle.wait()).await {
                Ok(result) => result.map(Some),
                Err(_) => Ok(None),
            },
            None => handle.wait().await.map(Some),
        }
    }
}

/// Termination of the direct child only; descendants are not tracked
#[async_trait]
pub trait ProcessTermination: ProcessLifecycle {
    /// Ask the process to exit (SIGTERM on Unix)
    async fn terminate_gracefully(&self, handle: &mut Self::Handle) -> TerminationResult;

    /// Kill the process unconditionally (SIGKILL on Unix)
    async fn force_kill(&self, handle: &mut Self::Handle) -> TerminationResult;
}

/// Secondary liveness check against the operating system's process table.
///
/// Consulted after a direct poll reports the child alive, to catch cases where
/// polling alone is unreliable. Platforms without an equivalent answer
/// [`ProcessPresence::Unsupported`].
pub trait ProcessTable: Send + Sync {
    fn probe(&self, pid: ProcessId) -> ProcessPresence;
}

/// Cross-check that never has an opinion.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProcessTable;

impl ProcessTable for NoProcessTable {
    fn probe(&self, _pid: ProcessId) -> ProcessPresence {
        ProcessPresence::Unsupported
    }
}

/// A complete platform implementation
pub trait ProcessManager: ProcessLifecycle + ProcessTermination {
    /// Create a new process manager instance
    fn new() -> Self
    where
        Self: Sized;

    /// Cross-check used by default for processes spawned by this manager
    fn process_table(&self) -> Arc<dyn ProcessTable>;
}

/// Factory trait for creating platform-specific process managers
pub trait ProcessManagerFactory {
    /// The type of process manager this factory creates
    type Manager: ProcessManager;

    /// Create a process manager for the current platform
    fn create_process_manager() -> Self::Manager;

    /// Get the platform name for logging and debugging
    fn platform_name() -> &'static str;
}

/// Take the piped stdout/stderr of a freshly spawned child and drain them in
/// background tasks, forwarding each line to `tracing` at debug level. The
/// child would otherwise stall once a pipe buffer fills up.
pub fn drain_output(program: &str, child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        spawn_drain(program.to_string(), "stdout", stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_drain(program.to_string(), "stderr", stderr);
    }
}

fn spawn_drain<R>(program: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => debug!(program = %program, stream, "{line}"),
                Ok(None) => break,
                Err(e) => {
                    debug!(program = %program, stream, error = %e, "Stopped reading child output");
                    break;
                }
            }
        }
    });
}
