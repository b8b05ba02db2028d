//! bcache create/attach/detach/destroy.
//!
//! The kernel never hands back the identity of anything it creates
//! here, so every step recovers it indirectly: the cache set UUID is
//! scraped out of `make-bcache` stdout, the bcache device name is
//! reverse-resolved through the `slaves/` sysfs layout, and the
//! currently attached cache set is read off a symlink target.

use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use blockdev_core::{sysfs, CommandRunner, Error, Result, SystemRunner};

const MAKE_BCACHE: &str = "make-bcache";

lazy_static! {
    static ref SET_UUID: Regex = Regex::new(r"Set UUID:\s+([-a-z0-9]+)").unwrap();
}

/// Manager for bcache cache/backing device bindings.
pub struct BcacheManager {
    runner: Box<dyn CommandRunner>,
    sysfs_root: PathBuf,
}

impl BcacheManager {
    pub fn new() -> Self {
        Self::with_parts(Box::new(SystemRunner), "/sys")
    }

    pub fn with_parts(runner: Box<dyn CommandRunner>, sysfs_root: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            sysfs_root: sysfs_root.into(),
        }
    }

    /// Bind `cache_device` to `backing_device` and return the name of
    /// the resulting bcache device (e.g. `bcache0`).
    ///
    /// If the final attach step fails the backing device stays
    /// registered; nothing is rolled back.
    pub fn create(&self, backing_device: &str, cache_device: &str) -> Result<String> {
        info!(
            backing = backing_device,
            cache = cache_device,
            "creating bcache device"
        );

        // make-bcache writes the metadata and is the only place the
        // new cache set's UUID ever shows up.
        let output = self
            .runner
            .capture(MAKE_BCACHE, &["-B", backing_device, "-C", cache_device])?;
        let set_uuid = parse_set_uuid(&output)?;
        debug!(%set_uuid, "parsed cache set UUID");

        // The short name ("sdb1") is what shows up under slaves/ below.
        let short_name = backing_device
            .rsplit_once('/')
            .map(|(_, name)| name)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                Error::SetupFailed(format!("'{backing_device}' is not a device path"))
            })?;

        sysfs::write_attr(backing_device, &self.sysfs_root.join("fs/bcache/register"))?;

        let bcache_name = self.resolve_device_name(short_name)?;

        self.attach(&set_uuid, &bcache_name)
            .map_err(|e| e.context("failed to attach the cache to the backing device"))?;

        Ok(bcache_name)
    }

    /// Attach the cache set `set_uuid` to `bcache_device`.
    pub fn attach(&self, set_uuid: &str, bcache_device: &str) -> Result<()> {
        let device = strip_dev_prefix(bcache_device);
        sysfs::write_attr(set_uuid, &self.bcache_attr(device, "attach"))
    }

    /// Detach the cache from `bcache_device`, returning the UUID of the
    /// cache set that was attached. The kernel flushes dirty data to
    /// the backing device as part of handling the detach write.
    pub fn detach(&self, bcache_device: &str) -> Result<String> {
        let device = strip_dev_prefix(bcache_device);

        let cache_link = self.bcache_attr(device, "cache");
        if cache_link.symlink_metadata().is_err() {
            return Err(Error::NotAttached(device.to_string()));
        }

        let set_uuid = self.attached_set_uuid(device, &cache_link)?;

        sysfs::write_attr(&set_uuid, &self.bcache_attr(device, "detach")).map_err(|e| {
            Error::DetachFailed {
                uuid: set_uuid.clone(),
                device: device.to_string(),
                detail: e.to_string(),
            }
        })?;

        info!(device, %set_uuid, "detached cache set");
        Ok(set_uuid)
    }

    /// Detach, then stop the cache set and the bcache device.
    ///
    /// The cache set is stopped first; if stopping the bcache device
    /// fails afterwards the cache set stays stopped, a terminal partial
    /// state that is reported but not rolled back.
    pub fn destroy(&self, bcache_device: &str) -> Result<()> {
        let device = strip_dev_prefix(bcache_device);

        let set_uuid = self.detach(device)?;

        sysfs::write_attr(
            "1",
            &self.sysfs_root.join("fs/bcache").join(&set_uuid).join("stop"),
        )
        .map_err(|e| e.context("failed to stop the cache set"))?;

        sysfs::write_attr("1", &self.bcache_attr(device, "stop"))
            .map_err(|e| e.context("failed to stop the bcache"))?;

        info!(device, %set_uuid, "destroyed bcache device");
        Ok(())
    }

    /// Reverse-resolve the bcache device wrapping a backing device.
    ///
    /// A registered backing device appears as
    /// `/sys/block/<wrapper>/slaves/<short_name>`; the wrapper name is
    /// the match's grandparent directory. A backing device slaved to
    /// several wrappers is not disambiguated: the first match wins.
    fn resolve_device_name(&self, short_name: &str) -> Result<String> {
        let pattern = format!(
            "{}/block/*/slaves/{}",
            self.sysfs_root.display(),
            short_name
        );
        let mut matches = glob::glob(&pattern)
            .map_err(|e| Error::SetupFailed(format!("bad glob pattern '{pattern}': {e}")))?;

        let path = matches.find_map(|entry| entry.ok()).ok_or_else(|| {
            Error::SetupFailed(format!(
                "failed to determine bcache device name for '{short_name}'"
            ))
        })?;

        let name = path
            .parent()
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .ok_or_else(|| {
                Error::SetupFailed(format!("unexpected sysfs layout at '{}'", path.display()))
            })?;
        Ok(name.to_string_lossy().into_owned())
    }

    /// `/sys/block/<dev>/bcache/cache` is a symlink into
    /// `/sys/fs/bcache/<set uuid>`; the UUID is the target's final
    /// segment.
    fn attached_set_uuid(&self, device: &str, cache_link: &Path) -> Result<String> {
        let target = fs::read_link(cache_link).map_err(|e| {
            Error::UuidResolution(format!(
                "failed to read '{}' for '{}': {}",
                cache_link.display(),
                device,
                e
            ))
        })?;
        let uuid = target.file_name().ok_or_else(|| {
            Error::UuidResolution(format!(
                "'{}' points at '{}', which has no final segment",
                cache_link.display(),
                target.display()
            ))
        })?;
        Ok(uuid.to_string_lossy().into_owned())
    }

    fn bcache_attr(&self, device: &str, attr: &str) -> PathBuf {
        self.sysfs_root
            .join("block")
            .join(device)
            .join("bcache")
            .join(attr)
    }
}

impl Default for BcacheManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the cache set UUID from `make-bcache` output, first matching
/// line wins.
fn parse_set_uuid(output: &str) -> Result<String> {
    for line in output.lines() {
        if let Some(caps) = SET_UUID.captures(line) {
            return Ok(caps[1].to_string());
        }
    }
    Err(Error::BcacheParse(output.to_string()))
}

fn strip_dev_prefix(device: &str) -> &str {
    device.strip_prefix("/dev/").unwrap_or(device)
}
