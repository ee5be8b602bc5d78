use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use runwarden_core::*;

/// CREATE_NEW_PROCESS_GROUP: console control events aimed at the child stay with it
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
/// CREATE_NO_WINDOW: no console window pops up for background programs
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Windows-specific process handle implementation
pub struct WindowsProcessHandle {
    child: Child,
}

impl WindowsProcessHandle {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

#[async_trait]
impl ProcessHandle for WindowsProcessHandle {
    fn get_pid(&self) -> Option<ProcessId> {
        self.child.id().map(ProcessId::from)
    }

    fn try_wait(&mut self) -> Result<Option<ExitReport>, ProcessError> {
        Ok(self.child.try_wait()?.map(ExitReport::from))
    }

    async fn wait(&mut self) -> Result<ExitReport, ProcessError> {
        let status = self.child.wait().await?;
        Ok(status.into())
    }
}

/// Process-table cross-check backed by `sysinfo`.
pub struct SysinfoProcessTable {
    system: Mutex<System>,
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn probe(&self, pid: ProcessId) -> ProcessPresence {
        let target = Pid::from_u32(pid.0);
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);

        match system.process(target).map(|p| p.status()) {
            Some(sysinfo::ProcessStatus::Zombie | sysinfo::ProcessStatus::Dead) | None => {
                debug!(pid = pid.0, "Process is no longer in the process table");
                ProcessPresence::Gone
            }
            Some(_) => ProcessPresence::Alive,
        }
    }
}

/// Windows-specific process manager
pub struct WindowsProcessManager {
    table: Arc<SysinfoProcessTable>,
}

impl Default for WindowsProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowsProcessManager {
    /// Use taskkill without /F, which asks the program's windows to close
    async fn taskkill(&self, pid: u32) -> std::io::Result<bool> {
        let output = Command::new("taskkill")
            .args(["/PID", &pid.to_string()])
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(output.status.success())
    }
}

#[async_trait]
impl ProcessLifecycle for WindowsProcessManager {
    type Handle = WindowsProcessHandle;

    async fn spawn_process(
        &self,
        request: &SpawnRequest<'_>,
    ) -> Result<WindowsProcessHandle, ProcessError> {
        let command = request.command.display().to_string();

        let mut cmd = Command::new(request.command);
        cmd.args(request.args)
            .current_dir(request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed(format!("{command}: {e}")))?;
        drain_output(request.program, &mut child);

        if let Some(pid) = child.id() {
            info!(
                program = request.program,
                pid,
                command = %command,
                args = ?request.args,
                "Spawned Windows process"
            );
        }

        Ok(WindowsProcessHandle::new(child))
    }
}

#[async_trait]
impl ProcessTermination for WindowsProcessManager {
    async fn terminate_gracefully(&self, handle: &mut WindowsProcessHandle) -> TerminationResult {
        let Some(pid) = handle.get_pid() else {
            return TerminationResult::ProcessNotFound;
        };

        match self.taskkill(pid.0).await {
            Ok(true) => {
                info!(pid = pid.0, "Sent graceful termination to process");
                TerminationResult::Success
            }
            Ok(false) if self.table.probe(pid) == ProcessPresence::Gone => {
                info!(pid = pid.0, "Process not found (already terminated)");
                TerminationResult::ProcessNotFound
            }
            Ok(false) => {
                // Console programs without a window can only be terminated forcefully
                warn!(pid = pid.0, "Process refused graceful termination");
                TerminationResult::Failed("taskkill could not close the process".to_string())
            }
            Err(e) => {
                warn!(pid = pid.0, error = %e, "Failed to run taskkill");
                TerminationResult::Failed(format!("Graceful termination failed: {e}"))
            }
        }
    }

    async fn force_kill(&self, handle: &mut WindowsProcessHandle) -> TerminationResult {
        let Some(pid) = handle.get_pid() else {
            return TerminationResult::ProcessNotFound;
        };

        match handle.child.start_kill() {
            Ok(()) => {
                info!(pid = pid.0, "Force killed process");
                TerminationResult::Success
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                warn!(pid = pid.0, error = %e, "Permission denied to kill process");
                TerminationResult::AccessDenied
            }
            Err(e) => {
                warn!(pid = pid.0, error = %e, "Failed to force kill process");
                TerminationResult::Failed(format!("Force kill failed: {e}"))
            }
        }
    }
}

impl ProcessManager for WindowsProcessManager {
    fn new() -> Self {
        debug!("Initializing Windows process manager with system monitoring");
        Self {
            table: Arc::new(SysinfoProcessTable::new()),
        }
    }

    fn process_table(&self) -> Arc<dyn ProcessTable> {
        self.table.clone()
    }
}
