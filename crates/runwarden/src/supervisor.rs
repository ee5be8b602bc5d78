use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use runwarden_core::{
    EventKind, EventSink, ExitReport, PathResolver, ProcessHandle, ProcessId, ProcessManager,
    ProcessPresence, ProcessTable, ProgramDescriptor, SpawnRequest, SupervisorError,
    SupervisorEvent, TerminationResult,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Wait after a graceful termination request before escalating to a kill
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// The name was known; its descriptor was replaced, runtime state kept
    Replaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: ProcessId },
    AlreadyRunning { pid: Option<ProcessId> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Graceful { exit: ExitReport },
    Forced { exit: ExitReport },
}

impl StopOutcome {
    pub fn was_forced(&self) -> bool {
        matches!(self, StopOutcome::Forced { .. })
    }
}

/// Point-in-time view of one registered program.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramStatus {
    pub name: String,
    pub running: bool,
    pub pid: Option<ProcessId>,
    pub started_at: Option<DateTime<Utc>>,
    pub command_line: String,
    pub working_directory: PathBuf,
}

impl ProgramStatus {
    pub fn uptime(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.started_at.map(|started| now - started)
    }
}

/// Runtime record of one descriptor
struct TrackedProcess<H> {
    descriptor: ProgramDescriptor,
    handle: Option<H>,
    pid: Option<ProcessId>,
    running: bool,
    started_at: Option<DateTime<Utc>>,
}

impl<H> TrackedProcess<H> {
    fn new(descriptor: ProgramDescriptor) -> Self {
        Self {
            descriptor,
            handle: None,
            pid: None,
            running: false,
            started_at: None,
        }
    }

    fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Clear the runtime state. The released handle is dropped by the
    /// caller, which kills the child should it still be around.
    fn mark_stopped(&mut self) -> Option<H> {
        self.running = false;
        self.pid = None;
        self.started_at = None;
        self.handle.take()
    }

    fn status(&self) -> ProgramStatus {
        ProgramStatus {
            name: self.descriptor.name.clone(),
            running: self.running,
            pid: self.pid,
            started_at: self.started_at,
            command_line: self.descriptor.command_line(),
            working_directory: self.descriptor.working_directory.clone(),
        }
    }
}

/// A tracked process plus the last status published from it. Snapshots read
/// the published copy so they never wait behind a start or stop.
struct Slot<H> {
    state: Mutex<TrackedProcess<H>>,
    published: parking_lot::Mutex<ProgramStatus>,
}

impl<H> Slot<H> {
    fn new(descriptor: ProgramDescriptor) -> Self {
        let tracked = TrackedProcess::new(descriptor);
        Self {
            published: parking_lot::Mutex::new(tracked.status()),
            state: Mutex::new(tracked),
        }
    }

    fn publish(&self, tracked: &TrackedProcess<H>) {
        *self.published.lock() = tracked.status();
    }
}

struct Registry<H> {
    order: Vec<String>,
    slots: HashMap<String, Arc<Slot<H>>>,
}

/// Owns the tracked processes and performs every start, stop and liveness
/// refresh on them.
///
/// Each program sits behind its own async mutex, held for the whole of an
/// operation, so a start and a concurrent refresh never see a half-updated
/// entry. Operations on different programs do not block each other.
pub struct Supervisor<M: ProcessManager> {
    platform: Arc<M>,
    sink: Arc<dyn EventSink>,
    table: Arc<dyn ProcessTable>,
    resolver: PathResolver,
    grace_period: Duration,
    registry: RwLock<Registry<M::Handle>>,
}

impl<M: ProcessManager> Supervisor<M> {
    pub fn new(platform: M, sink: Arc<dyn EventSink>) -> Self {
        let table = platform.process_table();
        Self {
            platform: Arc::new(platform),
            sink,
            table,
            resolver: PathResolver::default(),
            grace_period: DEFAULT_GRACE_PERIOD,
            registry: RwLock::new(Registry {
                order: Vec::new(),
                slots: HashMap::new(),
            }),
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.resolver = PathResolver::new(timeout);
        self
    }

    /// Replace the process-table cross-check, e.g. with `NoProcessTable`
    pub fn with_process_table(mut self, table: Arc<dyn ProcessTable>) -> Self {
        self.table = table;
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    fn emit(&self, program: &str, kind: EventKind, message: impl Into<String>) {
        self.sink.emit(SupervisorEvent::new(program, kind, message));
    }

    fn slot(&self, name: &str) -> Option<Arc<Slot<M::Handle>>> {
        self.registry.read().slots.get(name).cloned()
    }

    fn slots_in_order(&self) -> Vec<Arc<Slot<M::Handle>>> {
        let registry = self.registry.read();
        registry
            .order
            .iter()
            .filter_map(|name| registry.slots.get(name).cloned())
            .collect()
    }

    /// Track a program. A known name gets its descriptor replaced while its
    /// runtime state, including a live child, is kept.
    pub async fn register(&self, descriptor: ProgramDescriptor) -> RegisterOutcome {
        let name = descriptor.name.clone();
        let existing = {
            let mut registry = self.registry.write();
            match registry.slots.get(&name) {
                Some(slot) => Some(slot.clone()),
                None => {
                    registry.order.push(name.clone());
                    registry
                        .slots
                        .insert(name.clone(), Arc::new(Slot::new(descriptor.clone())));
                    None
                }
            }
        };

        match existing {
            Some(slot) => {
                let mut tracked = slot.state.lock().await;
                tracked.descriptor = descriptor;
                slot.publish(&tracked);
                self.emit(
                    &name,
                    EventKind::ProgramRegistered { replaced: true },
                    "Program definition replaced",
                );
                RegisterOutcome::Replaced
            }
            None => {
                self.emit(
                    &name,
                    EventKind::ProgramRegistered { replaced: false },
                    "Program registered",
                );
                RegisterOutcome::Registered
            }
        }
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<String> {
        self.registry.read().order.clone()
    }

    pub async fn descriptor(&self, name: &str) -> Option<ProgramDescriptor> {
        let slot = self.slot(name)?;
        let tracked = slot.state.lock().await;
        Some(tracked.descriptor.clone())
    }

    /// Start a program unless it is already running.
    pub async fn start(&self, name: &str) -> Result<StartOutcome, SupervisorError> {
        let Some(slot) = self.slot(name) else {
            self.emit(name, EventKind::StartFailed, "Cannot start unknown program");
            return Err(SupervisorError::UnknownProgram(name.to_string()));
        };

        let mut tracked = slot.state.lock().await;
        let result = self.start_locked(&mut tracked).await;
        slot.publish(&tracked);
        result
    }

    async fn start_locked(
        &self,
        tracked: &mut TrackedProcess<M::Handle>,
    ) -> Result<StartOutcome, SupervisorError> {
        let name = tracked.name().to_string();

        if self.refresh_locked(tracked) {
            let pid = tracked.pid;
            self.emit(
                &name,
                EventKind::AlreadyRunning { pid },
                "Program is already running",
            );
            return Ok(StartOutcome::AlreadyRunning { pid });
        }

        let descriptor = tracked.descriptor.clone();
        self.emit(
            &name,
            EventKind::StartAttempted,
            format!("Starting: {}", descriptor.command_line()),
        );

        if !descriptor.working_directory.is_dir() {
            self.emit(
                &name,
                EventKind::StartFailed,
                format!(
                    "Working directory does not exist: {}",
                    descriptor.working_directory.display()
                ),
            );
            return Err(SupervisorError::InvalidWorkingDirectory {
                name,
                path: descriptor.working_directory,
            });
        }

        let Some(target) = self
            .resolver
            .resolve(&descriptor.working_directory, &descriptor.executable)
            .await
        else {
            self.emit(
                &name,
                EventKind::StartFailed,
                format!("Executable not found: {}", descriptor.executable),
            );
            return Err(SupervisorError::ExecutableNotFound {
                name,
                executable: descriptor.executable,
            });
        };
        if target.is_local() {
            debug!(program = %name, path = %target.command().display(), "Launching from working directory");
        } else {
            debug!(program = %name, executable = %descriptor.executable, "Launching through search path");
        }

        let request = SpawnRequest {
            program: &name,
            command: target.command(),
            args: &descriptor.arguments,
            working_dir: &descriptor.working_directory,
        };
        let spawned = self.platform.spawn_process(&request).await.and_then(|handle| {
            match handle.get_pid() {
                Some(pid) => Ok((handle, pid)),
                None => Err(runwarden_core::ProcessError::SpawnFailed(
                    "process exited before its id could be read".to_string(),
                )),
            }
        });

        match spawned {
            Ok((handle, pid)) => {
                tracked.handle = Some(handle);
                tracked.pid = Some(pid);
                tracked.running = true;
                tracked.started_at = Some(Utc::now());
                self.emit(
                    &name,
                    EventKind::StartSucceeded { pid },
                    format!("Program started (PID: {pid})"),
                );
                Ok(StartOutcome::Started { pid })
            }
            Err(e) => {
                let reason = e.to_string();
                self.emit(
                    &name,
                    EventKind::StartFailed,
                    format!("Failed to start program: {reason}"),
                );
                Err(SupervisorError::SpawnFailed { name, reason })
            }
        }
    }

    /// Stop a program, gracefully first and forcibly once the grace period
    /// has elapsed. Stopping a program that is not running succeeds.
    ///
    /// On failure the program keeps its handle and stays running, so the
    /// caller can retry.
    pub async fn stop(&self, name: &str) -> Result<StopOutcome, SupervisorError> {
        let Some(slot) = self.slot(name) else {
            self.emit(name, EventKind::StopFailed, "Cannot stop unknown program");
            return Err(SupervisorError::UnknownProgram(name.to_string()));
        };

        let mut tracked = slot.state.lock().await;
        let result = self.stop_locked(&mut tracked).await;
        slot.publish(&tracked);
        result
    }

    async fn stop_locked(
        &self,
        tracked: &mut TrackedProcess<M::Handle>,
    ) -> Result<StopOutcome, SupervisorError> {
        let name = tracked.name().to_string();

        if !self.refresh_locked(tracked) {
            debug!(program = %name, "Stop requested for a program that is not running");
            return Ok(StopOutcome::NotRunning);
        }
        let Some(handle) = tracked.handle.as_mut() else {
            return Ok(StopOutcome::NotRunning);
        };

        let pid = tracked
            .pid
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "?".to_string());
        self.emit(
            &name,
            EventKind::StopAttempted,
            format!("Stopping program (PID: {pid})"),
        );

        match self.terminate(&name, handle).await {
            Ok(outcome) => {
                tracked.mark_stopped();
                let (forced, message) = match outcome {
                    StopOutcome::Forced { exit } => {
                        (true, format!("Program force-stopped ({exit})"))
                    }
                    StopOutcome::Graceful { exit } => {
                        (false, format!("Program stopped gracefully ({exit})"))
                    }
                    StopOutcome::NotRunning => (false, "Program stopped".to_string()),
                };
                self.emit(&name, EventKind::StopSucceeded { forced }, message);
                Ok(outcome)
            }
            Err(reason) => {
                self.emit(
                    &name,
                    EventKind::StopFailed,
                    format!("Failed to stop program: {reason}"),
                );
                Err(SupervisorError::StopFailed { name, reason })
            }
        }
    }

    async fn terminate(&self, name: &str, handle: &mut M::Handle) -> Result<StopOutcome, String> {
        match self.platform.terminate_gracefully(handle).await {
            TerminationResult::Success | TerminationResult::ProcessNotFound => {
                match self
                    .platform
                    .wait_for_exit(handle, Some(self.grace_period))
                    .await
                {
                    Ok(Some(exit)) => return Ok(StopOutcome::Graceful { exit }),
                    Ok(None) => {
                        debug!(program = %name, grace_period = ?self.grace_period, "Grace period elapsed")
                    }
                    Err(e) => return Err(e.to_string()),
                }
            }
            other => {
                warn!(program = %name, result = ?other, "Graceful termination refused, escalating");
            }
        }

        match self.platform.force_kill(handle).await {
            TerminationResult::Success | TerminationResult::ProcessNotFound => {}
            TerminationResult::AccessDenied => return Err("permission denied".to_string()),
            TerminationResult::Failed(reason) => return Err(reason),
        }

        // A kill cannot be ignored, so this wait has no timeout
        match self.platform.wait_for_exit(handle, None).await {
            Ok(exit) => Ok(StopOutcome::Forced {
                exit: exit.unwrap_or_else(ExitReport::unknown),
            }),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Whether the program's child is alive, updating the tracked state when
    /// it is found to have exited.
    pub async fn is_running(&self, name: &str) -> bool {
        let Some(slot) = self.slot(name) else {
            return false;
        };
        let mut tracked = slot.state.lock().await;
        let running = self.refresh_locked(&mut tracked);
        slot.publish(&tracked);
        running
    }

    /// Two-tier liveness check: direct poll of the child, then the process
    /// table. Failures degrade to "not running".
    fn refresh_locked(&self, tracked: &mut TrackedProcess<M::Handle>) -> bool {
        let Some(handle) = tracked.handle.as_mut() else {
            tracked.running = false;
            return false;
        };

        match handle.try_wait() {
            Ok(Some(exit)) => {
                tracked.mark_stopped();
                self.emit(
                    tracked.name(),
                    EventKind::ProcessExited { code: exit.code },
                    format!("Program exited ({exit})"),
                );
                false
            }
            Ok(None) => {
                let presence = tracked
                    .pid
                    .map_or(ProcessPresence::Unsupported, |pid| self.table.probe(pid));
                if presence == ProcessPresence::Gone {
                    tracked.mark_stopped();
                    self.emit(
                        tracked.name(),
                        EventKind::ProcessExited { code: None },
                        "Program is no longer in the process table",
                    );
                    return false;
                }
                tracked.running = true;
                true
            }
            Err(e) => {
                tracked.mark_stopped();
                self.emit(
                    tracked.name(),
                    EventKind::LivenessCheckFailed,
                    format!("Liveness check failed, assuming stopped: {e}"),
                );
                false
            }
        }
    }

    /// Refresh every tracked program. Programs busy with a start or stop are
    /// skipped; whoever holds them leaves them consistent.
    pub async fn refresh_all(&self) {
        for slot in self.slots_in_order() {
            match slot.state.try_lock() {
                Ok(mut tracked) => {
                    self.refresh_locked(&mut tracked);
                    slot.publish(&tracked);
                }
                Err(_) => debug!("Skipping liveness refresh of a busy program"),
            }
        }
    }

    /// Names observed running, in registration order
    pub async fn running_names(&self) -> Vec<String> {
        let mut running = Vec::new();
        for slot in self.slots_in_order() {
            let mut tracked = slot.state.lock().await;
            if self.refresh_locked(&mut tracked) {
                running.push(tracked.name().to_string());
            }
            slot.publish(&tracked);
        }
        running
    }

    /// Last published status of every program, in registration order.
    /// Does not poll.
    pub fn snapshot(&self) -> Vec<ProgramStatus> {
        self.slots_in_order()
            .iter()
            .map(|slot| slot.published.lock().clone())
            .collect()
    }

    /// Stop every registered program, in registration order.
    pub async fn shutdown_all(&self) -> Vec<(String, Result<StopOutcome, SupervisorError>)> {
        let mut results = Vec::new();
        for name in self.names() {
            let result = self.stop(&name).await;
            results.push((name, result));
        }
        results
    }
}

impl<M: ProcessManager> Drop for Supervisor<M> {
    fn drop(&mut self) {
        let running = self
            .snapshot()
            .into_iter()
            .filter(|status| status.running)
            .count();
        if running > 0 {
            warn!(
                running,
                "Supervisor dropped with running programs; their children will be killed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProcessManager, RecordingSink, fixture_descriptor};
    use runwarden_core::NoProcessTable;
    use tempfile::TempDir;

    struct Harness {
        supervisor: Supervisor<FakeProcessManager>,
        platform: FakeProcessManager,
        sink: Arc<RecordingSink>,
        dir: TempDir,
    }

    async fn harness(names: &[&str]) -> Harness {
        let dir = TempDir::new().unwrap();
        let platform = FakeProcessManager::new();
        let sink = Arc::new(RecordingSink::default());
        let supervisor = Supervisor::new(platform.clone(), sink.clone())
            .with_grace_period(Duration::from_millis(100));
        for name in names {
            supervisor
                .register(fixture_descriptor(dir.path(), name))
                .await;
        }
        Harness {
            supervisor,
            platform,
            sink,
            dir,
        }
    }

    #[tokio::test]
    async fn test_registered_program_is_stopped() {
        let h = harness(&["a", "b"]).await;

        assert!(!h.supervisor.is_running("a").await);
        assert!(!h.supervisor.is_running("b").await);
        assert!(h.supervisor.running_names().await.is_empty());
        assert_eq!(h.supervisor.names(), vec!["a", "b"]);
        assert_eq!(
            h.sink.kinds_for("a"),
            vec![EventKind::ProgramRegistered { replaced: false }]
        );
    }

    #[tokio::test]
    async fn test_unknown_program() {
        let h = harness(&["a"]).await;

        assert!(!h.supervisor.is_running("zzz").await);
        assert!(matches!(
            h.supervisor.start("zzz").await,
            Err(SupervisorError::UnknownProgram(_))
        ));
        assert!(matches!(
            h.supervisor.stop("zzz").await,
            Err(SupervisorError::UnknownProgram(_))
        ));
        assert!(h.supervisor.descriptor("zzz").await.is_none());
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let h = harness(&["a"]).await;

        let first = h.supervisor.start("a").await.unwrap();
        let StartOutcome::Started { pid } = first else {
            panic!("expected a fresh start, got {first:?}");
        };
        let second = h.supervisor.start("a").await.unwrap();

        assert_eq!(second, StartOutcome::AlreadyRunning { pid: Some(pid) });
        assert_eq!(h.platform.spawn_count(), 1);
        assert!(h.supervisor.is_running("a").await);
    }

    #[tokio::test]
    async fn test_start_records_state() {
        let h = harness(&["a"]).await;
        let before = Utc::now();

        h.supervisor.start("a").await.unwrap();

        let status = &h.supervisor.snapshot()[0];
        assert!(status.running);
        assert!(status.pid.is_some());
        assert!(status.started_at.unwrap() >= before);
        assert!(h.sink.kinds_for("a").contains(&EventKind::StartSucceeded {
            pid: status.pid.unwrap()
        }));
    }

    #[tokio::test]
    async fn test_stop_never_started_is_noop() {
        let h = harness(&["a"]).await;

        assert_eq!(h.supervisor.stop("a").await.unwrap(), StopOutcome::NotRunning);
        assert!(!h.supervisor.is_running("a").await);
        assert!(!h.sink.kinds_for("a").contains(&EventKind::StopAttempted));
    }

    #[tokio::test]
    async fn test_graceful_stop() {
        let h = harness(&["a"]).await;
        h.supervisor.start("a").await.unwrap();

        let outcome = h.supervisor.stop("a").await.unwrap();

        assert!(matches!(outcome, StopOutcome::Graceful { .. }));
        assert!(!h.supervisor.is_running("a").await);
        let status = &h.supervisor.snapshot()[0];
        assert_eq!(status.pid, None);
        assert_eq!(status.started_at, None);
        assert!(h
            .sink
            .kinds_for("a")
            .contains(&EventKind::StopSucceeded { forced: false }));
    }

    #[tokio::test]
    async fn test_forced_stop_after_grace_period() {
        let h = harness(&["a"]).await;
        h.platform.set_ignore_term(true);
        h.supervisor.start("a").await.unwrap();

        let started = std::time::Instant::now();
        let outcome = h.supervisor.stop("a").await.unwrap();

        assert!(outcome.was_forced());
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(!h.supervisor.is_running("a").await);
        assert!(h
            .sink
            .kinds_for("a")
            .contains(&EventKind::StopSucceeded { forced: true }));
    }

    #[tokio::test]
    async fn test_failed_stop_leaves_program_running() {
        let h = harness(&["a"]).await;
        h.platform.set_ignore_term(true);
        h.platform.set_fail_kill(true);
        h.supervisor.start("a").await.unwrap();

        let err = h.supervisor.stop("a").await.unwrap_err();
        assert!(matches!(err, SupervisorError::StopFailed { .. }));
        assert!(h.supervisor.is_running("a").await);
        assert!(h.sink.kinds_for("a").contains(&EventKind::StopFailed));

        // Retrying once the OS cooperates succeeds
        h.platform.set_fail_kill(false);
        assert!(h.supervisor.stop("a").await.unwrap().was_forced());
        assert!(!h.supervisor.is_running("a").await);
    }

    #[tokio::test]
    async fn test_spawn_failure_keeps_program_stopped() {
        let h = harness(&["a"]).await;
        h.platform.set_fail_spawn(true);

        let err = h.supervisor.start("a").await.unwrap_err();

        assert!(matches!(err, SupervisorError::SpawnFailed { .. }));
        assert!(!h.supervisor.is_running("a").await);
        assert!(h.sink.kinds_for("a").contains(&EventKind::StartFailed));
    }

    #[tokio::test]
    async fn test_missing_working_directory_does_not_spawn() {
        let h = harness(&[]).await;
        let mut descriptor = fixture_descriptor(h.dir.path(), "a");
        descriptor.working_directory = h.dir.path().join("missing");
        h.supervisor.register(descriptor).await;

        let err = h.supervisor.start("a").await.unwrap_err();

        assert!(matches!(err, SupervisorError::InvalidWorkingDirectory { .. }));
        assert_eq!(h.platform.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_relative_working_directory_spawns_absolute_path() {
        let h = harness(&[]).await;
        let cwd = std::env::current_dir().unwrap();
        let dir = TempDir::new_in(&cwd).unwrap();
        let mut descriptor = fixture_descriptor(dir.path(), "a");
        descriptor.working_directory = dir.path().strip_prefix(&cwd).unwrap().to_path_buf();
        assert!(descriptor.working_directory.is_relative());
        h.supervisor.register(descriptor).await;

        h.supervisor.start("a").await.unwrap();

        assert_eq!(h.platform.last_command(), Some(dir.path().join("tool")));
    }

    #[tokio::test]
    async fn test_unresolvable_executable() {
        let h = harness(&[]).await;
        let mut descriptor = fixture_descriptor(h.dir.path(), "a");
        descriptor.executable = "runwarden-no-such-executable".to_string();
        h.supervisor.register(descriptor).await;

        let err = h.supervisor.start("a").await.unwrap_err();

        assert!(matches!(err, SupervisorError::ExecutableNotFound { .. }));
        assert_eq!(h.platform.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_self_exit_observed_once() {
        let h = harness(&["a"]).await;
        h.supervisor.start("a").await.unwrap();

        h.platform.last_process().unwrap().exit_with(Some(4), None);
        h.supervisor.refresh_all().await;
        h.supervisor.refresh_all().await;

        assert!(!h.supervisor.is_running("a").await);
        let exits: Vec<_> = h
            .sink
            .kinds_for("a")
            .into_iter()
            .filter(|k| matches!(k, EventKind::ProcessExited { .. }))
            .collect();
        assert_eq!(exits, vec![EventKind::ProcessExited { code: Some(4) }]);
        assert!(!h.supervisor.snapshot()[0].running);
    }

    #[tokio::test]
    async fn test_process_table_cross_check() {
        struct EverythingGone;
        impl ProcessTable for EverythingGone {
            fn probe(&self, _pid: ProcessId) -> ProcessPresence {
                ProcessPresence::Gone
            }
        }

        let h = harness(&["a"]).await;
        let supervisor = Supervisor::new(h.platform.clone(), h.sink.clone())
            .with_process_table(Arc::new(EverythingGone));
        supervisor
            .register(fixture_descriptor(h.dir.path(), "b"))
            .await;

        supervisor.start("b").await.unwrap();
        assert!(!supervisor.is_running("b").await);
        assert!(h
            .sink
            .kinds_for("b")
            .contains(&EventKind::ProcessExited { code: None }));

        let unchecked = Supervisor::new(h.platform.clone(), h.sink.clone())
            .with_process_table(Arc::new(NoProcessTable));
        unchecked
            .register(fixture_descriptor(h.dir.path(), "c"))
            .await;
        unchecked.start("c").await.unwrap();
        assert!(unchecked.is_running("c").await);
    }

    #[tokio::test]
    async fn test_liveness_error_assumes_stopped() {
        let h = harness(&["a"]).await;
        h.supervisor.start("a").await.unwrap();

        h.platform.last_process().unwrap().fail_polls();

        assert!(!h.supervisor.is_running("a").await);
        assert!(h
            .sink
            .kinds_for("a")
            .contains(&EventKind::LivenessCheckFailed));
    }

    #[tokio::test]
    async fn test_reregister_replaces_descriptor_keeps_child() {
        let h = harness(&["a"]).await;
        h.supervisor.start("a").await.unwrap();

        let mut replacement = fixture_descriptor(h.dir.path(), "a");
        replacement.arguments = vec!["--verbose".to_string()];
        let outcome = h.supervisor.register(replacement.clone()).await;

        assert_eq!(outcome, RegisterOutcome::Replaced);
        assert_eq!(h.supervisor.names(), vec!["a"]);
        assert!(h.supervisor.is_running("a").await);
        assert_eq!(h.supervisor.descriptor("a").await.unwrap(), replacement);
        assert!(h.supervisor.snapshot()[0].command_line.ends_with("--verbose"));
    }

    #[tokio::test]
    async fn test_running_names_in_registration_order() {
        let h = harness(&["c", "a", "b"]).await;
        h.supervisor.start("b").await.unwrap();
        h.supervisor.start("c").await.unwrap();

        assert_eq!(h.supervisor.running_names().await, vec!["c", "b"]);
        let snapshot: Vec<_> = h
            .supervisor
            .snapshot()
            .into_iter()
            .map(|s| (s.name, s.running))
            .collect();
        assert_eq!(
            snapshot,
            vec![
                ("c".to_string(), true),
                ("a".to_string(), false),
                ("b".to_string(), true)
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_all() {
        let h = harness(&["a", "b", "c"]).await;
        h.supervisor.start("a").await.unwrap();
        h.supervisor.start("c").await.unwrap();

        let results = h.supervisor.shutdown_all().await;

        assert_eq!(results.len(), 3);
        assert!(matches!(results[0].1, Ok(StopOutcome::Graceful { .. })));
        assert!(matches!(results[1].1, Ok(StopOutcome::NotRunning)));
        assert!(matches!(results[2].1, Ok(StopOutcome::Graceful { .. })));
        assert!(h.supervisor.running_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_skips_busy_program() {
        let h = harness(&["a"]).await;
        h.supervisor.start("a").await.unwrap();
        h.platform.last_process().unwrap().exit_with(Some(0), None);

        let slot = h.supervisor.slot("a").unwrap();
        let guard = slot.state.lock().await;
        h.supervisor.refresh_all().await;
        assert!(h.supervisor.snapshot()[0].running);
        drop(guard);

        h.supervisor.refresh_all().await;
        assert!(!h.supervisor.snapshot()[0].running);
    }
}
