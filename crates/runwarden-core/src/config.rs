use crate::{ConfigError, ProgramDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_MONITOR_INTERVAL_SECONDS: u64 = 2;
pub const DEFAULT_LOG_DIRECTORY: &str = "./logs";

/// Application-wide settings section of the configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Seconds between two liveness refreshes
    #[serde(
        default = "default_monitor_interval_seconds",
        alias = "monitorIntervalSeconds"
    )]
    pub monitor_interval_seconds: u64,

    /// Directory the log file is written to
    #[serde(default = "default_log_directory", alias = "logDirectory")]
    pub log_directory: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            monitor_interval_seconds: default_monitor_interval_seconds(),
            log_directory: default_log_directory(),
        }
    }
}

impl Settings {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_seconds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "monitor_interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.log_directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "log_directory must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The whole configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub programs: Vec<ProgramDescriptor>,
}

impl AppConfig {
    /// Document written when no configuration file exists yet.
    pub fn placeholder() -> Self {
        #[cfg(windows)]
        let (working_directory, executable) = ("C:\\path\\to\\program", "program.exe");
        #[cfg(not(windows))]
        let (working_directory, executable) = ("/path/to/program", "program");

        Self {
            settings: Settings::default(),
            programs: vec![ProgramDescriptor {
                name: "sample-program".to_string(),
                working_directory: PathBuf::from(working_directory),
                executable: executable.to_string(),
                arguments: Vec::new(),
            }],
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;

        let mut seen = HashSet::new();
        for (index, program) in self.programs.iter().enumerate() {
            program
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("programs[{index}]: {e}")))?;
            if !seen.insert(program.name.as_str()) {
                return Err(ConfigError::DuplicateProgram(program.name.clone()));
            }
        }
        Ok(())
    }

    pub fn find_program(&self, name: &str) -> Option<&ProgramDescriptor> {
        self.programs.iter().find(|p| p.name == name)
    }
}

/// Outcome of [`ConfigLoader::load`].
#[derive(Debug)]
pub enum LoadStatus {
    /// The document was read and validated
    Loaded,
    /// No document existed; a default one was written and nothing was loaded
    CreatedDefault,
    /// The document could not be used; defaults are in effect
    Invalid(ConfigError),
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: AppConfig,
    pub status: LoadStatus,
}

impl ConfigLoad {
    pub fn is_loaded(&self) -> bool {
        matches!(self.status, LoadStatus::Loaded)
    }
}

/// Reads the JSON configuration document, synthesizing it when absent.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_FILE)
    }
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document. Never fails: problems are reported through
    /// [`LoadStatus`] and the returned config falls back to defaults with no
    /// programs.
    pub fn load(&self) -> ConfigLoad {
        if !self.path.exists() {
            let status = match self.write_default() {
                Ok(()) => {
                    info!(path = %self.path.display(), "Created default configuration file");
                    LoadStatus::CreatedDefault
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Failed to create default configuration file");
                    LoadStatus::Invalid(e)
                }
            };
            return ConfigLoad {
                config: AppConfig::default(),
                status,
            };
        }

        match self.read() {
            Ok(config) => {
                info!(
                    path = %self.path.display(),
                    programs = config.programs.len(),
                    "Loaded configuration"
                );
                ConfigLoad {
                    config,
                    status: LoadStatus::Loaded,
                }
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Configuration rejected, using defaults");
                ConfigLoad {
                    config: AppConfig::default(),
                    status: LoadStatus::Invalid(e),
                }
            }
        }
    }

    /// Read and validate the document without any fallback.
    pub fn read(&self) -> Result<AppConfig, ConfigError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        let config: AppConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn write_default(&self) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&AppConfig::placeholder())?;
        std::fs::write(&self.path, json).map_err(io_err)
    }
}

// Default value functions for serde
fn default_monitor_interval_seconds() -> u64 {
    DEFAULT_MONITOR_INTERVAL_SECONDS
}
fn default_log_directory() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIRECTORY)
}
