//! In-memory platform and event recorder for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use runwarden_core::{
    EventKind, EventSink, ExitReport, NoProcessTable, ProcessError, ProcessHandle, ProcessId,
    ProcessLifecycle, ProcessManager, ProcessTable, ProcessTermination, ProgramDescriptor,
    SpawnRequest, SupervisorEvent, TerminationResult,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::watch;

/// Descriptor whose executable exists in `dir`, so resolution never probes
/// the search path.
pub fn fixture_descriptor(dir: &Path, name: &str) -> ProgramDescriptor {
    std::fs::write(dir.join("tool"), "").unwrap();
    ProgramDescriptor::builder()
        .name(name)
        .working_directory(dir)
        .executable("tool")
        .build()
        .unwrap()
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SupervisorEvent>>,
}

impl RecordingSink {
    pub fn kinds_for(&self, program: &str) -> Vec<EventKind> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.program == program)
            .map(|event| event.kind.clone())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: SupervisorEvent) {
        self.events.lock().push(event);
    }
}

pub struct FakeProcess {
    pid: ProcessId,
    exit: watch::Sender<Option<ExitReport>>,
    poll_fails: AtomicBool,
}

impl FakeProcess {
    pub fn exit_with(&self, code: Option<i32>, signal: Option<i32>) {
        self.exit.send_if_modified(|exit| {
            if exit.is_some() {
                return false;
            }
            *exit = Some(ExitReport { code, signal });
            true
        });
    }

    pub fn fail_polls(&self) {
        self.poll_fails.store(true, Ordering::SeqCst);
    }

    fn exited(&self) -> bool {
        self.exit.borrow().is_some()
    }
}

pub struct FakeHandle {
    process: Arc<FakeProcess>,
}

#[async_trait]
impl ProcessHandle for FakeHandle {
    fn get_pid(&self) -> Option<ProcessId> {
        (!self.process.exited()).then_some(self.process.pid)
    }

    fn try_wait(&mut self) -> Result<Option<ExitReport>, ProcessError> {
        if self.process.poll_fails.load(Ordering::SeqCst) {
            return Err(ProcessError::Io(std::io::Error::other("simulated poll failure")));
        }
        Ok(*self.process.exit.borrow())
    }

    async fn wait(&mut self) -> Result<ExitReport, ProcessError> {
        let mut rx = self.process.exit.subscribe();
        let exit = *rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ProcessError::Io(std::io::Error::other("fake process vanished")))?;
        Ok(exit.unwrap_or_default())
    }
}

#[derive(Default)]
struct FakeState {
    processes: Mutex<Vec<Arc<FakeProcess>>>,
    commands: Mutex<Vec<PathBuf>>,
    next_pid: AtomicU32,
    ignore_term: AtomicBool,
    fail_kill: AtomicBool,
    fail_spawn: AtomicBool,
}

/// Platform whose "processes" only exit when told to. Clones share state.
#[derive(Clone, Default)]
pub struct FakeProcessManager {
    state: Arc<FakeState>,
}

impl FakeProcessManager {
    pub fn spawn_count(&self) -> usize {
        self.state.processes.lock().len()
    }

    pub fn last_process(&self) -> Option<Arc<FakeProcess>> {
        self.state.processes.lock().last().cloned()
    }

    pub fn last_command(&self) -> Option<PathBuf> {
        self.state.commands.lock().last().cloned()
    }

    pub fn set_ignore_term(&self, value: bool) {
        self.state.ignore_term.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_kill(&self, value: bool) {
        self.state.fail_kill.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_spawn(&self, value: bool) {
        self.state.fail_spawn.store(value, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessLifecycle for FakeProcessManager {
    type Handle = FakeHandle;

    async fn spawn_process(&self, request: &SpawnRequest<'_>) -> Result<FakeHandle, ProcessError> {
        if self.state.fail_spawn.load(Ordering::SeqCst) {
            return Err(ProcessError::SpawnFailed("simulated spawn failure".to_string()));
        }

        self.state.commands.lock().push(request.command.to_path_buf());
        let pid = ProcessId(1000 + self.state.next_pid.fetch_add(1, Ordering::SeqCst));
        let (exit, _) = watch::channel(None);
        let process = Arc::new(FakeProcess {
            pid,
            exit,
            poll_fails: AtomicBool::new(false),
        });
        self.state.processes.lock().push(process.clone());

        Ok(FakeHandle { process })
    }
}

#[async_trait]
impl ProcessTermination for FakeProcessManager {
    async fn terminate_gracefully(&self, handle: &mut FakeHandle) -> TerminationResult {
        if handle.process.exited() {
            return TerminationResult::ProcessNotFound;
        }
        if !self.state.ignore_term.load(Ordering::SeqCst) {
            handle.process.exit_with(None, Some(15));
        }
        TerminationResult::Success
    }

    async fn force_kill(&self, handle: &mut FakeHandle) -> TerminationResult {
        if self.state.fail_kill.load(Ordering::SeqCst) {
            return TerminationResult::Failed("simulated kill failure".to_string());
        }
        if handle.process.exited() {
            return TerminationResult::ProcessNotFound;
        }
        handle.process.exit_with(None, Some(9));
        TerminationResult::Success
    }
}

impl ProcessManager for FakeProcessManager {
    fn new() -> Self {
        Self::default()
    }

    fn process_table(&self) -> Arc<dyn ProcessTable> {
        Arc::new(NoProcessTable)
    }
}
