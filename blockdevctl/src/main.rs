//! blockdevctl: command-line control of zRAM and bcache block devices.
//!
//! Every public operation of the device managers maps onto one
//! subcommand. All commands mutate kernel state and normally require
//! root.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;

use blockdev_core::{config, SystemRunner};
use blockdev_devices::{BcacheManager, ZramManager};
use blockdev_kmod::ModuleManager;

#[derive(Parser, Debug)]
#[command(name = "blockdevctl")]
#[command(about = "Manage zRAM and bcache kernel block devices")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compressed RAM block devices
    Zram {
        #[command(subcommand)]
        command: ZramCommands,
    },
    /// Cache/backing device bindings
    Bcache {
        #[command(subcommand)]
        command: BcacheCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ZramCommands {
    /// Create one device per --size, activating each with the given size in bytes
    Create {
        /// Device size in bytes; repeat once per device
        #[arg(long = "size", required = true)]
        sizes: Vec<u64>,

        /// Compression stream count; when given, repeat once per device
        #[arg(long = "streams")]
        streams: Vec<u64>,
    },
    /// Unload the zram module, destroying every zRAM device
    Destroy,
}

#[derive(Subcommand, Debug)]
enum BcacheCommands {
    /// Bind a cache device to a backing device and print the new device name
    Create {
        /// Backing (slow) device path, e.g. /dev/sdb1
        backing_device: String,
        /// Cache (fast) device path, e.g. /dev/sdc1
        cache_device: String,
    },
    /// Attach a cache set to an existing bcache device
    Attach {
        /// Cache set UUID
        set_uuid: String,
        /// bcache device, with or without a /dev/ prefix
        device: String,
    },
    /// Detach the cache and print the cache set UUID that was attached
    Detach {
        /// bcache device, with or without a /dev/ prefix
        device: String,
    },
    /// Detach, then stop the cache set and the bcache device
    Destroy {
        /// bcache device, with or without a /dev/ prefix
        device: String,
    },
}

fn main() -> Result<()> {
    // Load environment from /etc/blockdevctl/environment (if exists)
    config::load_environment();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("blockdevctl=info".parse()?)
                .add_directive("blockdev_core=info".parse()?)
                .add_directive("blockdev_kmod=info".parse()?)
                .add_directive("blockdev_devices=info".parse()?),
        )
        .init();

    let args = Args::parse();
    debug!(sysfs_root = %config::sysfs_root().display(), "dispatching");

    match args.command {
        Commands::Zram { command } => run_zram(command),
        Commands::Bcache { command } => run_bcache(command),
    }
}

fn run_zram(command: ZramCommands) -> Result<()> {
    let manager = ZramManager::with_parts(Box::new(ModuleManager::new()), config::sysfs_root());

    match command {
        ZramCommands::Create { sizes, streams } => {
            let nstreams = if streams.is_empty() {
                None
            } else {
                Some(streams.as_slice())
            };
            manager.create_devices(&sizes, nstreams)?;
            println!("created {} zram device(s)", sizes.len());
        }
        ZramCommands::Destroy => {
            manager.destroy_devices()?;
            println!("zram devices destroyed");
        }
    }
    Ok(())
}

fn run_bcache(command: BcacheCommands) -> Result<()> {
    let manager = BcacheManager::with_parts(Box::new(SystemRunner), config::sysfs_root());

    match command {
        BcacheCommands::Create {
            backing_device,
            cache_device,
        } => {
            let name = manager.create(&backing_device, &cache_device)?;
            println!("{name}");
        }
        BcacheCommands::Attach { set_uuid, device } => {
            manager.attach(&set_uuid, &device)?;
            println!("attached {set_uuid} to {device}");
        }
        BcacheCommands::Detach { device } => {
            let set_uuid = manager.detach(&device)?;
            println!("{set_uuid}");
        }
        BcacheCommands::Destroy { device } => {
            manager.destroy(&device)?;
            println!("destroyed {device}");
        }
    }
    Ok(())
}
