#[cfg(unix)]
mod unix_impl {
    use async_trait::async_trait;
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use runwarden_core::{
        ExitReport, ProcessError, ProcessHandle, ProcessId, ProcessLifecycle, ProcessManager,
        ProcessPresence, ProcessTable, ProcessTermination, SpawnRequest, TerminationResult,
        drain_output,
    };
    use std::process::Stdio;
    use std::sync::Arc;
    use tokio::process::{Child, Command};
    use tracing::{debug, info, warn};

    fn nix_pid(pid: ProcessId) -> Option<NixPid> {
        i32::try_from(pid.0).ok().map(NixPid::from_raw)
    }

    /// Unix-specific process handle implementation
    pub struct UnixProcessHandle {
        child: Child,
    }

    impl UnixProcessHandle {
        pub fn new(child: Child) -> Self {
            Self { child }
        }
    }

    #[async_trait]
    impl ProcessHandle for UnixProcessHandle {
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

    /// Process-table cross-check based on signal 0.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct UnixProcessTable;

    impl ProcessTable for UnixProcessTable {
        fn probe(&self, pid: ProcessId) -> ProcessPresence {
            let Some(nix_pid) = nix_pid(pid) else {
                return ProcessPresence::Unsupported;
            };
            match signal::kill(nix_pid, None) {
                Ok(()) => ProcessPresence::Alive,
                Err(Errno::ESRCH) => {
                    debug!(pid = pid.0, "Process is no longer in the process table");
                    ProcessPresence::Gone
                }
                // The pid exists but belongs to someone we may not signal
                Err(Errno::EPERM) => ProcessPresence::Alive,
                Err(e) => {
                    warn!(pid = pid.0, error = %e, "Process table lookup failed");
                    ProcessPresence::Unsupported
                }
            }
        }
    }

    /// Unix-specific process manager
    pub struct UnixProcessManager {
        table: Arc<UnixProcessTable>,
    }

    impl Default for UnixProcessManager {
        fn default() -> Self {
            Self::new()
        }
    }

    impl UnixProcessManager {
        fn send_signal(&self, handle: &UnixProcessHandle, signal: Signal) -> TerminationResult {
            let Some(pid) = handle.get_pid() else {
                return TerminationResult::ProcessNotFound;
            };
            let Some(target) = nix_pid(pid) else {
                return TerminationResult::Failed(format!("pid {pid} out of range"));
            };

            match signal::kill(target, signal) {
                Ok(()) => {
                    info!(pid = pid.0, signal = %signal, "Sent signal to process");
                    TerminationResult::Success
                }
                Err(Errno::ESRCH) => {
                    info!(pid = pid.0, "Process not found (already terminated)");
                    TerminationResult::ProcessNotFound
                }
                Err(Errno::EPERM) => {
                    warn!(pid = pid.0, signal = %signal, "Permission denied to signal process");
                    TerminationResult::AccessDenied
                }
                Err(e) => {
                    warn!(pid = pid.0, signal = %signal, error = %e, "Failed to signal process");
                    TerminationResult::Failed(format!("{signal} failed: {e}"))
                }
            }
        }
    }

    #[async_trait]
    impl ProcessLifecycle for UnixProcessManager {
        type Handle = UnixProcessHandle;

        async fn spawn_process(
            &self,
            request: &SpawnRequest<'_>,
        ) -> Result<UnixProcessHandle, ProcessError> {
            let command = request.command.display().to_string();

            let mut cmd = Command::new(request.command);
            cmd.args(request.args)
                .current_dir(request.working_dir)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                // Own process group: signals aimed at the child never reach us
                .process_group(0);

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
                    "Spawned Unix process"
                );
            }

            Ok(UnixProcessHandle::new(child))
        }
    }

    #[async_trait]
    impl ProcessTermination for UnixProcessManager {
        async fn terminate_gracefully(&self, handle: &mut UnixProcessHandle) -> TerminationResult {
            self.send_signal(handle, Signal::SIGTERM)
        }

        async fn force_kill(&self, handle: &mut UnixProcessHandle) -> TerminationResult {
            self.send_signal(handle, Signal::SIGKILL)
        }
    }

    impl ProcessManager for UnixProcessManager {
        fn new() -> Self {
            debug!("Initializing Unix process manager");
            Self {
                table: Arc::new(UnixProcessTable),
            }
        }

        fn process_table(&self) -> Arc<dyn ProcessTable> {
            self.table.clone()
        }
    }

}

#[cfg(unix)]
pub use unix_impl::{UnixProcessHandle, UnixProcessManager, UnixProcessTable};

// Provide stub types for non-Unix systems
#[cfg(not(unix))]
pub struct UnixProcessHandle;

#[cfg(not(unix))]
pub struct UnixProcessManager;

#[cfg(not(unix))]
pub struct UnixProcessTable;
