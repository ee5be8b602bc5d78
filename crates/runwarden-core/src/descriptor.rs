use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Static definition of a launchable program.
///
/// Descriptors are produced by the configuration loader (or built in code with
/// [`ProgramDescriptor::builder`]) and never change once handed to the
/// supervisor. The `name` is the key every supervisor operation uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ProgramDescriptor {
    pub name: String,
    #[serde(alias = "workingDirectory")]
    pub working_directory: PathBuf,
    pub executable: String,
    #[serde(default)]
    #[builder(default)]
    #[builder(setter(custom))]
    pub arguments: Vec<String>,
}

impl ProgramDescriptor {
    pub fn builder() -> ProgramDescriptorBuilder {
        ProgramDescriptorBuilder::default()
    }

    /// Checks the invariants the builder enforces. Descriptors that come in
    /// through serde skip the builder, so the config loader calls this.
    pub fn validate(&self) -> Result<(), String> {
        check_name(&self.name)?;
        check_working_directory(&self.working_directory)?;
        check_executable(&self.executable)
    }

    /// Full command line as it will be spawned, for display.
    pub fn command_line(&self) -> String {
        std::iter::once(self.executable.as_str())
            .chain(self.arguments.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl ProgramDescriptorBuilder {
    pub fn arguments<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        self.arguments = Some(iter.into_iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn argument<S: ToString>(&mut self, arg: S) -> &mut Self {
        self.arguments
            .get_or_insert_with(Vec::new)
            .push(arg.to_string());
        self
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            check_name(name)?;
        }
        if let Some(dir) = &self.working_directory {
            check_working_directory(dir)?;
        }
        if let Some(executable) = &self.executable {
            check_executable(executable)?;
        }
        Ok(())
    }
}

fn check_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("program name must not be empty".to_string());
    }
    Ok(())
}

fn check_working_directory(dir: &Path) -> Result<(), String> {
    if dir.as_os_str().is_empty() {
        return Err("working directory must not be empty".to_string());
    }
    Ok(())
}

fn check_executable(executable: &str) -> Result<(), String> {
    if executable.trim().is_empty() {
        return Err("executable must not be empty".to_string());
    }
    Ok(())
}
