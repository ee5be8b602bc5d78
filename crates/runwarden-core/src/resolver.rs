use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// How long the search-path probe may run before it is considered a miss
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of looking for an executable inside the working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(PathBuf),
    NotFoundLocally,
}

/// Where a program will be launched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchTarget {
    /// File inside the working directory (or an absolute path), always held
    /// as an absolute path so the child's working directory is not applied twice
    Local(PathBuf),
    /// Bare name left for the operating system's search path
    SearchPath(PathBuf),
}

impl LaunchTarget {
    pub fn command(&self) -> &Path {
        match self {
            LaunchTarget::Local(path) | LaunchTarget::SearchPath(path) => path,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, LaunchTarget::Local(_))
    }
}

/// Check whether `executable` exists relative to `working_directory`.
/// Absolute executables are checked as they are.
pub fn resolve_local(working_directory: &Path, executable: &str) -> Resolution {
    let candidate = working_directory.join(executable);
    if candidate.is_file() {
        Resolution::Found(candidate)
    } else {
        Resolution::NotFoundLocally
    }
}

/// Best-effort check that `executable` can be found through the search path.
///
/// Runs `executable --version` with all stdio discarded. Any exit status,
/// including a non-zero one, counts as found; a spawn failure, a signal
/// death or running past `timeout` counts as not found.
///
/// This is a heuristic, not a guarantee. Invoking an arbitrary binary with a
/// version flag can itself have side effects, and a binary that ignores the
/// kill sent on timeout may outlive the probe.
pub async fn is_on_search_path(executable: &str, timeout: Duration) -> bool {
    let mut cmd = Command::new(executable);
    cmd.arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            debug!(executable, error = %e, "Search path probe could not launch executable");
            return false;
        }
    };

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(signal) = status.signal() {
                    debug!(executable, signal, "Search path probe crashed");
                    return false;
                }
            }
            debug!(executable, status = %status, "Search path probe answered");
            true
        }
        Ok(Err(e)) => {
            debug!(executable, error = %e, "Search path probe failed while waiting");
            false
        }
        Err(_) => {
            debug!(executable, ?timeout, "Search path probe timed out");
            if let Err(e) = child.kill().await {
                debug!(executable, error = %e, "Search path probe could not be killed");
            }
            false
        }
    }
}

/// Decides whether a program is launchable before it is spawned.
#[derive(Debug, Clone)]
pub struct PathResolver {
    probe_timeout: Duration,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl PathResolver {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// The working directory is searched first, then the search path.
    pub async fn resolve(&self, working_directory: &Path, executable: &str) -> Option<LaunchTarget> {
        if let Resolution::Found(path) = resolve_local(working_directory, executable) {
            match std::path::absolute(&path) {
                Ok(path) => return Some(LaunchTarget::Local(path)),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Local executable has no absolute form");
                }
            }
        }
        if is_on_search_path(executable, self.probe_timeout).await {
            return Some(LaunchTarget::SearchPath(PathBuf::from(executable)));
        }
        None
    }
}
