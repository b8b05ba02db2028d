//! Environment Configuration Loader
//!
//! Loads environment variables from the canonical location:
//! `/etc/blockdevctl/environment`, so every blockdev tool shares the
//! same configuration. Call [`load_environment`] early in `main()`
//! before reading any configuration.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Paths checked for an environment file, in order of priority.
pub const ENV_FILE_PATHS: &[&str] = &["/etc/blockdevctl/environment", ".env"];

/// Variable that redirects the sysfs root away from `/sys`.
pub const SYSFS_ROOT_VAR: &str = "BLOCKDEV_SYSFS_ROOT";

/// Where sysfs control files live.
///
/// Defaults to `/sys`; honours [`SYSFS_ROOT_VAR`] so the managers can be
/// pointed at an alternate tree.
pub fn sysfs_root() -> PathBuf {
    std::env::var_os(SYSFS_ROOT_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/sys"))
}

/// Load environment variables from the canonical configuration file.
///
/// Checks `BLOCKDEV_ENV_FILE` first, then the paths in
/// [`ENV_FILE_PATHS`]. Existing environment variables are never
/// overridden. Returns the path that was loaded, or `None` if no file
/// was found.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var("BLOCKDEV_ENV_FILE") {
        if let Some(path) = try_load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded_path) = try_load_env_file(path) {
            return Some(loaded_path);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

/// Try to load an environment file from the given path.
fn try_load_env_file(path: &str) -> Option<String> {
    if !Path::new(path).exists() {
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = parse_env_line(line) {
                    // Don't override existing environment variables
                    if std::env::var(&key).is_err() {
                        std::env::set_var(&key, &value);
                        debug!("Loaded: {}", key);
                    } else {
                        debug!("Skipped (already set): {}", key);
                    }
                }
            }
            Some(path.to_string())
        }
        Err(e) => {
            debug!("Failed to read {}: {}", path, e);
            None
        }
    }
}

/// Parse a `KEY=VALUE` line, stripping surrounding quotes from the value.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    Some((key.to_string(), value.to_string()))
}
