//! Writing kernel control files under sysfs.
//!
//! Every state-changing request this system issues to the kernel goes
//! through [`write_attr`]; the managers only differ in which pseudo-file
//! they target and in what order.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

/// Write `value` to a sysfs control file.
///
/// The value is written exactly as given (the kernel does not require a
/// trailing newline) and the file is flushed before it is closed, so a
/// successful return means the kernel has seen the request.
pub fn write_attr(value: &str, path: &Path) -> Result<()> {
    debug!(path = %path.display(), value, "writing sysfs attribute");

    let mut file = File::create(path).map_err(|e| {
        Error::io(
            format!("failed to write '{}' to '{}'", value, path.display()),
            e,
        )
    })?;
    file.write_all(value.as_bytes()).map_err(|e| {
        Error::io(
            format!("failed to write '{}' to '{}'", value, path.display()),
            e,
        )
    })?;
    file.flush()
        .map_err(|e| Error::io(format!("failed to flush '{}'", path.display()), e))?;
    Ok(())
}
