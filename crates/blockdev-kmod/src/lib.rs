//! Kernel module load and unload.
//!
//! Modules are driven through the module subsystem's userspace tools
//! (`modinfo`, `modprobe`, `rmmod`) with both output streams captured,
//! so their diagnostics never leak onto the caller's stderr.
//!
//! Loading is deliberately not idempotent: `modprobe --first-time`
//! fails when the module is already in the kernel, which callers rely
//! on to detect stale configurations and reload.

use std::fs;
use std::path::PathBuf;

use tracing::info;

use blockdev_core::{CommandRunner, Error, Result, SystemRunner};

/// Where the kernel lists currently loaded modules.
const PROC_MODULES: &str = "/proc/modules";

/// Seam between the device managers and the kernel module subsystem.
pub trait ModuleControl: Send + Sync {
    /// Load `name`, passing `options` as `key=value` module parameters.
    fn load(&self, name: &str, options: &[String]) -> Result<()>;

    /// Unload `name`. Fails with `ModuleNotFound` if it is not loaded.
    fn unload(&self, name: &str) -> Result<()>;
}

/// Real module manager backed by the system's kmod tools.
pub struct ModuleManager {
    runner: Box<dyn CommandRunner>,
    loaded_list: PathBuf,
}

impl ModuleManager {
    pub fn new() -> Self {
        Self::with_runner(Box::new(SystemRunner))
    }

    pub fn with_runner(runner: Box<dyn CommandRunner>) -> Self {
        Self {
            runner,
            loaded_list: PathBuf::from(PROC_MODULES),
        }
    }

    /// Override where the loaded-modules list is read from.
    pub fn loaded_list(mut self, path: impl Into<PathBuf>) -> Self {
        self.loaded_list = path.into();
        self
    }

    /// Names of currently loaded modules, first column of the list file.
    fn loaded_modules(&self) -> Result<Vec<String>> {
        let contents = fs::read_to_string(&self.loaded_list).map_err(|e| {
            Error::io(
                format!("failed to read '{}'", self.loaded_list.display()),
                e,
            )
        })?;
        Ok(contents
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect())
    }
}

impl Default for ModuleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleControl for ModuleManager {
    fn load(&self, name: &str, options: &[String]) -> Result<()> {
        // A module with no backing file cannot be inserted; report that
        // distinctly from an insertion failure.
        self.runner
            .capture("modinfo", &["-n", name])
            .map_err(|e| match e {
                Error::CommandFailed { .. } => {
                    Error::ModuleNotFound(format!("'{name}' doesn't exist"))
                }
                Error::Io { source, .. } => {
                    Error::ModuleInitFailed(format!("modinfo unavailable: {source}"))
                }
                other => other,
            })?;

        let mut args: Vec<&str> = vec!["--first-time", name];
        args.extend(options.iter().map(String::as_str));

        info!(module = name, ?options, "loading kernel module");
        self.runner
            .capture("modprobe", &args)
            .map_err(|e| match e {
                Error::CommandFailed { detail, .. } if already_loaded(&detail) => {
                    Error::ModuleAlreadyLoaded {
                        name: name.to_string(),
                        detail,
                    }
                }
                Error::CommandFailed { detail, .. } => Error::ModuleOperationFailed(format!(
                    "failed to load module '{}' with options '{}': {}",
                    name,
                    options.join(" "),
                    detail
                )),
                Error::Io { source, .. } => {
                    Error::ModuleInitFailed(format!("modprobe unavailable: {source}"))
                }
                other => other,
            })?;
        Ok(())
    }

    fn unload(&self, name: &str) -> Result<()> {
        let loaded = self.loaded_modules()?;
        if !loaded.iter().any(|module| module == name) {
            return Err(Error::ModuleNotFound(format!("'{name}' is not loaded")));
        }

        info!(module = name, "unloading kernel module");
        self.runner.capture("rmmod", &[name]).map_err(|e| match e {
            Error::CommandFailed { detail, .. } => Error::ModuleOperationFailed(format!(
                "failed to unload module '{name}': {detail}"
            )),
            Error::Io { source, .. } => {
                Error::ModuleInitFailed(format!("rmmod unavailable: {source}"))
            }
            other => other,
        })?;
        Ok(())
    }
}

/// The kernel reports a duplicate insert as EEXIST; kmod renders it as
/// "File exists" or "Module already in kernel" depending on version.
fn already_loaded(detail: &str) -> bool {
    detail.contains("File exists") || detail.to_ascii_lowercase().contains("already")
}
