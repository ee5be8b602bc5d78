//! runwarden - keeps a configured set of external programs under supervision
//!
//! The [`Supervisor`] starts and stops programs and tracks their liveness,
//! the [`LivenessPoller`] refreshes that state periodically, and the
//! [`console`] module is the interactive front end used by the binary.

pub mod console;
mod platform_factory;
mod poller;
mod supervisor;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use platform_factory::{
    PlatformProcessManager, PlatformProcessManagerFactory, PlatformSupervisor,
};
pub use poller::{LivenessPoller, POLLER_SHUTDOWN_TIMEOUT, PollerShutdown};
pub use supervisor::{
    DEFAULT_GRACE_PERIOD, ProgramStatus, RegisterOutcome, StartOutcome, StopOutcome, Supervisor,
};

pub use runwarden_core::*;
