use runwarden_core::{EventSink, ProcessManagerFactory};
use std::sync::Arc;
use tracing::info;

use crate::supervisor::Supervisor;

#[cfg(unix)]
pub type PlatformProcessManager = runwarden_unix::UnixProcessManager;

#[cfg(windows)]
pub type PlatformProcessManager = runwarden_windows::WindowsProcessManager;

#[cfg(not(any(unix, windows)))]
compile_error!("Unsupported platform: only Unix and Windows are currently supported");

/// Supervisor driving real processes on the current platform
pub type PlatformSupervisor = Supervisor<PlatformProcessManager>;

/// Platform-agnostic factory that selects the appropriate implementation at compile time
pub struct PlatformProcessManagerFactory;

impl ProcessManagerFactory for PlatformProcessManagerFactory {
    type Manager = PlatformProcessManager;

    fn create_process_manager() -> PlatformProcessManager {
        #[cfg(unix)]
        return runwarden_unix::UnixProcessManagerFactory::create_process_manager();

        #[cfg(windows)]
        return runwarden_windows::WindowsProcessManagerFactory::create_process_manager();
    }

    fn platform_name() -> &'static str {
        #[cfg(unix)]
        return runwarden_unix::UnixProcessManagerFactory::platform_name();

        #[cfg(windows)]
        return runwarden_windows::WindowsProcessManagerFactory::platform_name();
    }
}

impl Supervisor<PlatformProcessManager> {
    /// Supervisor backed by the current platform's process manager and
    /// process-table cross-check.
    pub fn native(sink: Arc<dyn EventSink>) -> Self {
        info!(
            platform = PlatformProcessManagerFactory::platform_name(),
            "Creating process supervisor"
        );
        Supervisor::new(PlatformProcessManagerFactory::create_process_manager(), sink)
    }
}
