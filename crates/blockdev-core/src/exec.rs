//! External command execution with captured output.

use std::process::Command;

use tracing::debug;

use crate::error::{Error, Result};

/// Runs an external program and captures its stdout.
///
/// The managers depend on this trait rather than on
/// `std::process::Command` directly so the external tools can be
/// scripted in tests.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, returning captured stdout on success.
    fn capture(&self, program: &str, args: &[&str]) -> Result<String>;
}

/// Runner backed by `std::process::Command`.
///
/// Both stdout and stderr are captured; nothing the child prints ever
/// reaches the caller's terminal.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn capture(&self, program: &str, args: &[&str]) -> Result<String> {
        debug!(program, ?args, "running external command");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| Error::io(format!("failed to run '{program}'"), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::CommandFailed {
                command: format!("{} {}", program, args.join(" ")),
                detail: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
