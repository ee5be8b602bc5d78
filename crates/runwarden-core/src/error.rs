use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by supervisor operations.
///
/// None of these are fatal to the supervisor: a failed start leaves the
/// program stopped, a failed stop leaves it running so the caller can retry.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Unknown program: {0}")]
    UnknownProgram(String),

    #[error("Working directory for '{name}' does not exist: {}", path.display())]
    InvalidWorkingDirectory { name: String, path: PathBuf },

    #[error("Executable for '{name}' not found: {executable}")]
    ExecutableNotFound { name: String, executable: String },

    #[error("Failed to spawn '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    #[error("Failed to stop '{name}': {reason}")]
    StopFailed { name: String, reason: String },
}

impl SupervisorError {
    /// Name of the program the error refers to.
    pub fn program(&self) -> &str {
        match self {
            SupervisorError::UnknownProgram(name)
            | SupervisorError::InvalidWorkingDirectory { name, .. }
            | SupervisorError::ExecutableNotFound { name, .. }
            | SupervisorError::SpawnFailed { name, .. }
            | SupervisorError::StopFailed { name, .. } => name,
        }
    }

    /// Check if repeating the same call may succeed without changing the configuration
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SupervisorError::SpawnFailed { .. } | SupervisorError::StopFailed { .. }
        )
    }

    /// Check if the error can only be fixed by editing the program definition
    pub fn is_configuration_problem(&self) -> bool {
        matches!(
            self,
            SupervisorError::UnknownProgram(_)
                | SupervisorError::InvalidWorkingDirectory { .. }
                | SupervisorError::ExecutableNotFound { .. }
        )
    }
}

/// Errors raised while loading the configuration document.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Program name defined more than once: {0}")]
    DuplicateProgram(String),
}

/// Errors from the platform process layer.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
