mod unix_process_manager;

pub use unix_process_manager::{UnixProcessHandle, UnixProcessManager, UnixProcessTable};

pub struct UnixProcessManagerFactory;

#[cfg(unix)]
impl runwarden_core::ProcessManagerFactory for UnixProcessManagerFactory {
    type Manager = UnixProcessManager;

    fn create_process_manager() -> UnixProcessManager {
        use runwarden_core::ProcessManager;
        UnixProcessManager::new()
    }

    fn platform_name() -> &'static str {
        "Unix"
    }
}
