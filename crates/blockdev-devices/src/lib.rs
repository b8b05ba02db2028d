//! blockdev-devices: lifecycle managers for zRAM and bcache block devices.
//!
//! `ZramManager` and `BcacheManager` are the two entry points. They
//! drive the module loader, the sysfs write primitive, and the external
//! `make-bcache` tool; all of the kernel-facing state lives in sysfs,
//! not in this process.
//!
//! Both managers issue strictly sequential, blocking calls and assume a
//! single caller: concurrent invocations against the same module or
//! device race on the underlying kernel state.

pub mod bcache;
pub mod zram;

pub use bcache::BcacheManager;
pub use zram::ZramManager;
