//! End-to-end bcache lifecycle against a fake sysfs tree.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;
use std::sync::{Arc, Mutex};

use blockdev_core::{CommandRunner, Error, Result};
use blockdev_devices::BcacheManager;

const MAKE_BCACHE_OUTPUT: &str = "\
UUID:\t\t\t7a28e804-93c5-4a14-b7f8-123456789abc
Set UUID:\t\t1234-deadbeef
version:\t\t0
nbuckets:\t\t1024
";

/// Returns canned output and records every invocation.
#[derive(Clone)]
struct FakeTool {
    output: String,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeTool {
    fn new(output: &str) -> Self {
        Self {
            output: output.to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for FakeTool {
    fn capture(&self, program: &str, args: &[&str]) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", program, args.join(" ")));
        Ok(self.output.clone())
    }
}

/// Fake sysfs tree with an already-registered bcache0 wrapping sdb1.
fn fake_sysfs() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("fs/bcache")).unwrap();
    fs::create_dir_all(dir.path().join("block/bcache0/slaves")).unwrap();
    fs::create_dir_all(dir.path().join("block/bcache0/bcache")).unwrap();
    fs::write(dir.path().join("block/bcache0/slaves/sdb1"), "").unwrap();
    dir
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

fn attach_cache_symlink(root: &Path, device: &str, set_uuid: &str) {
    let target = root.join("fs/bcache").join(set_uuid);
    fs::create_dir_all(&target).unwrap();
    symlink(&target, root.join("block").join(device).join("bcache/cache")).unwrap();
}

#[test]
fn create_registers_resolves_and_attaches() {
    let sysfs = fake_sysfs();
    let tool = FakeTool::new(MAKE_BCACHE_OUTPUT);
    let manager = BcacheManager::with_parts(Box::new(tool.clone()), sysfs.path());

    let name = manager.create("/dev/sdb1", "/dev/sdc1").unwrap();

    assert_eq!(name, "bcache0");
    assert_eq!(
        tool.calls(),
        vec!["make-bcache -B /dev/sdb1 -C /dev/sdc1".to_string()]
    );
    assert_eq!(read(sysfs.path(), "fs/bcache/register"), "/dev/sdb1");
    assert_eq!(
        read(sysfs.path(), "block/bcache0/bcache/attach"),
        "1234-deadbeef"
    );
}

#[test]
fn create_without_set_uuid_performs_no_sysfs_writes() {
    let sysfs = fake_sysfs();
    let tool = FakeTool::new("bcache device created, but no identity line\n");
    let manager = BcacheManager::with_parts(Box::new(tool), sysfs.path());

    let err = manager.create("/dev/sdb1", "/dev/sdc1").unwrap_err();

    assert!(matches!(err, Error::BcacheParse(_)));
    assert!(err.to_string().contains("no identity line"));
    assert!(!sysfs.path().join("fs/bcache/register").exists());
    assert!(!sysfs.path().join("block/bcache0/bcache/attach").exists());
}

#[test]
fn create_rejects_backing_device_without_a_path() {
    let sysfs = fake_sysfs();
    let tool = FakeTool::new(MAKE_BCACHE_OUTPUT);
    let manager = BcacheManager::with_parts(Box::new(tool), sysfs.path());

    let err = manager.create("sdb1", "/dev/sdc1").unwrap_err();
    assert!(matches!(err, Error::SetupFailed(_)));
}

#[test]
fn attach_then_detach_round_trips_the_uuid() {
    let sysfs = fake_sysfs();
    let tool = FakeTool::new(MAKE_BCACHE_OUTPUT);
    let manager = BcacheManager::with_parts(Box::new(tool), sysfs.path());

    manager.attach("abcd", "bcache0").unwrap();
    assert_eq!(read(sysfs.path(), "block/bcache0/bcache/attach"), "abcd");

    attach_cache_symlink(sysfs.path(), "bcache0", "abcd");
    let detached = manager.detach("bcache0").unwrap();

    assert_eq!(detached, "abcd");
    assert_eq!(read(sysfs.path(), "block/bcache0/bcache/detach"), "abcd");
}

#[test]
fn detach_accepts_a_dev_prefixed_name() {
    let sysfs = fake_sysfs();
    attach_cache_symlink(sysfs.path(), "bcache0", "abcd");
    let tool = FakeTool::new(MAKE_BCACHE_OUTPUT);
    let manager = BcacheManager::with_parts(Box::new(tool), sysfs.path());

    assert_eq!(manager.detach("/dev/bcache0").unwrap(), "abcd");
}

#[test]
fn detach_without_cache_is_not_attached() {
    let sysfs = fake_sysfs();
    let tool = FakeTool::new(MAKE_BCACHE_OUTPUT);
    let manager = BcacheManager::with_parts(Box::new(tool), sysfs.path());

    let err = manager.detach("bcache0").unwrap_err();
    assert!(matches!(err, Error::NotAttached(_)));
    assert_eq!(
        err.to_string(),
        "no cache attached to 'bcache0' or 'bcache0' not set up"
    );
}

#[test]
fn destroy_stops_the_cache_set_then_the_device() {
    let sysfs = fake_sysfs();
    attach_cache_symlink(sysfs.path(), "bcache0", "abcd");
    let tool = FakeTool::new(MAKE_BCACHE_OUTPUT);
    let manager = BcacheManager::with_parts(Box::new(tool), sysfs.path());

    manager.destroy("/dev/bcache0").unwrap();

    assert_eq!(read(sysfs.path(), "fs/bcache/abcd/stop"), "1");
    assert_eq!(read(sysfs.path(), "block/bcache0/bcache/stop"), "1");
}

#[test]
fn destroy_stops_at_the_cache_set_when_its_stop_file_is_unwritable() {
    let sysfs = fake_sysfs();
    // Dangling symlink: the UUID still resolves, but there is no
    // fs/bcache/<uuid>/ directory to write the stop request into.
    symlink(
        sysfs.path().join("fs/bcache/gone"),
        sysfs.path().join("block/bcache0/bcache/cache"),
    )
    .unwrap();
    let tool = FakeTool::new(MAKE_BCACHE_OUTPUT);
    let manager = BcacheManager::with_parts(Box::new(tool), sysfs.path());

    let err = manager.destroy("bcache0").unwrap_err();

    assert!(err.to_string().contains("failed to stop the cache set"));
    // The bcache stop write must never have been attempted.
    assert!(!sysfs.path().join("block/bcache0/bcache/stop").exists());
}
