//! blockdev-core: shared primitives for the blockdev crates.
//!
//! Provides:
//! - The error taxonomy used across the workspace
//! - The sysfs control-file write primitive
//! - External command execution with captured output
//! - Environment configuration loading

pub mod config;
pub mod error;
pub mod exec;
pub mod sysfs;

pub use error::{Error, Result};
pub use exec::{CommandRunner, SystemRunner};
