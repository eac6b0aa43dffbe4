// 📄 virtio/blk/mod.rs
//! Virtio-blk块设备驱动模块

pub mod config;
pub mod device;

pub use config::SECTOR_SIZE;
pub use device::VirtioBlk;
