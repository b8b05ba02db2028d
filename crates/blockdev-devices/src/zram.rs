//! zRAM device batch creation and destruction.
//!
//! zRAM devices come into existence as a side effect of loading the
//! `zram` module with `num_devices=N`; they are configured afterwards
//! through their sysfs nodes and destroyed only by unloading the module
//! again.

use std::path::PathBuf;

use tracing::{info, warn};

use blockdev_core::{sysfs, Error, Result};
use blockdev_kmod::{ModuleControl, ModuleManager};

const MODULE_NAME: &str = "zram";

/// Manager for the kernel's compressed-RAM block devices.
pub struct ZramManager {
    modules: Box<dyn ModuleControl>,
    sysfs_root: PathBuf,
}

impl ZramManager {
    pub fn new() -> Self {
        Self::with_parts(Box::new(ModuleManager::new()), "/sys")
    }

    pub fn with_parts(modules: Box<dyn ModuleControl>, sysfs_root: impl Into<PathBuf>) -> Self {
        Self {
            modules,
            sysfs_root: sysfs_root.into(),
        }
    }

    /// Create one zRAM device per entry in `sizes` (sizes in bytes).
    ///
    /// When `nstreams` is given it must have one compression-stream
    /// count per device, and every stream count is written before any
    /// size: the size write is what activates a device, and activation
    /// locks the stream count in.
    pub fn create_devices(&self, sizes: &[u64], nstreams: Option<&[u64]>) -> Result<()> {
        if let Some(streams) = nstreams {
            if streams.len() != sizes.len() {
                return Err(Error::InvalidArgument(format!(
                    "expected {} stream counts, got {}",
                    sizes.len(),
                    streams.len()
                )));
            }
        }

        let options = vec![format!("num_devices={}", sizes.len())];
        if let Err(err) = self.modules.load(MODULE_NAME, &options) {
            match err {
                Error::ModuleAlreadyLoaded { .. } | Error::ModuleOperationFailed(_) => {
                    // Most likely loaded with a stale device count;
                    // unload and try once more with ours.
                    warn!(error = %err, "zram load failed, unloading and retrying");
                    self.modules.unload(MODULE_NAME).map_err(|e| {
                        Error::ModuleOperationFailed(format!("zram module already loaded: {e}"))
                    })?;
                    self.modules.load(MODULE_NAME, &options)?;
                }
                other => return Err(other),
            }
        }

        if let Some(streams) = nstreams {
            for (i, count) in streams.iter().enumerate() {
                sysfs::write_attr(&count.to_string(), &self.device_attr(i, "max_comp_streams"))
                    .map_err(|e| {
                        e.context(format!(
                            "failed to set number of compression streams for '/dev/zram{i}'"
                        ))
                    })?;
            }
        }

        // Size writes activate the devices, so they come last.
        for (i, size) in sizes.iter().enumerate() {
            sysfs::write_attr(&size.to_string(), &self.device_attr(i, "disksize"))
                .map_err(|e| e.context(format!("failed to set size for '/dev/zram{i}'")))?;
        }

        info!(devices = sizes.len(), "created zram devices");
        Ok(())
    }

    /// Destroy every zRAM device by unloading the module.
    ///
    /// The kernel offers no way to tear down a subset, so this takes no
    /// device argument.
    pub fn destroy_devices(&self) -> Result<()> {
        self.modules.unload(MODULE_NAME)
    }

    fn device_attr(&self, index: usize, attr: &str) -> PathBuf {
        self.sysfs_root
            .join("block")
            .join(format!("zram{index}"))
            .join(attr)
    }
}

impl Default for ZramManager {
    fn default() -> Self {
        Self::new()
    }
}
