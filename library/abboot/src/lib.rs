//! A/B 固件槽选择的二级引导程序库
//!
//! Stage-2 bootloader for aarch64 virtual machines. The pipeline is:
//!
//! 1. bring up one virtio-mmio block device ([`virtio`]);
//! 2. read the U-Boot style environment blob from disk ([`env`]);
//! 3. run the slot failback state machine and persist any change ([`failback`]);
//! 4. load the arm64 Linux `Image` and relocate/patch the device tree ([`kernel`]);
//! 5. hand control to the kernel ([`boot`], through the [`platform`] boundary).
//!
//! Only [`boot`] decides whether an error is recoverable or fatal; every other
//! module returns `Result`.
#![cfg_attr(not(test), no_std)]

pub mod boot;
pub mod config;
pub mod env;
pub mod error;
pub mod failback;
pub mod kernel;
pub mod platform;
pub mod virtio;

#[cfg(test)]
mod testing;

// 类型重导出
pub use config::{BootConfig, EnvNames};
pub use env::{Arena, EnvError, UbootEnv};
pub use error::FatalError;
pub use failback::{BootSelection, FailbackAction, Slot};
pub use kernel::{DeviceTree, DtbError, KernelHeader, LoadError};
pub use platform::Platform;
pub use virtio::{QueueMemory, RegisterAccess, VirtioBlk, VirtioError, VirtioMmio};

/// 程序名称与版本，启动横幅使用
pub const PROGRAM_NAME: &str = env!("CARGO_PKG_NAME");
pub const PROGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");
