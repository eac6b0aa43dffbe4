//! Virtio设备驱动模块
// library/abboot/src/virtio/mod.rs
//
// 只支持一个 virtio-mmio (version 2) 块设备、一个队列、同一时刻一个请求。

use core::ptr;

/// Virtio MMIO 设备寄存器偏移量
pub const VIRTIO_MAGIC_VALUE: usize = 0x000;
pub const VIRTIO_VERSION: usize = 0x004;
pub const VIRTIO_DEVICE_ID: usize = 0x008;
pub const VIRTIO_VENDOR_ID: usize = 0x00C;
pub const VIRTIO_DEVICE_FEATURES: usize = 0x010;
pub const VIRTIO_DEVICE_FEATURES_SEL: usize = 0x014;
pub const VIRTIO_DRIVER_FEATURES: usize = 0x020;
pub const VIRTIO_DRIVER_FEATURES_SEL: usize = 0x024;
pub const VIRTIO_QUEUE_SEL: usize = 0x030;
pub const VIRTIO_QUEUE_NUM_MAX: usize = 0x034;
pub const VIRTIO_QUEUE_NUM: usize = 0x038;
pub const VIRTIO_QUEUE_READY: usize = 0x044;
pub const VIRTIO_QUEUE_NOTIFY: usize = 0x050;
pub const VIRTIO_STATUS: usize = 0x070;
pub const VIRTIO_QUEUE_DESC_LOW: usize = 0x080;
pub const VIRTIO_QUEUE_DESC_HIGH: usize = 0x084;
pub const VIRTIO_QUEUE_DRIVER_LOW: usize = 0x090;
pub const VIRTIO_QUEUE_DRIVER_HIGH: usize = 0x094;
pub const VIRTIO_QUEUE_DEVICE_LOW: usize = 0x0A0;
pub const VIRTIO_QUEUE_DEVICE_HIGH: usize = 0x0A4;
/// 设备配置空间起始偏移
pub const VIRTIO_CONFIG: usize = 0x100;

/// 设备签名
pub const VIRTIO_MAGIC: u32 = 0x7472_6976; // "virt"
pub const VIRTIO_MMIO_VERSION_MODERN: u32 = 2;
pub const VIRTIO_DEVICE_ID_BLOCK: u32 = 2;
pub const VIRTIO_VENDOR_QEMU: u32 = 0x554D_4551; // "QEMU"

/// 32 位寄存器访问接口
///
/// 真实硬件使用 [`VirtioMmio`]；测试里用模拟设备实现它。
pub trait RegisterAccess {
    /// 读取32位寄存器
    fn read_reg(&self, offset: usize) -> u32;
    /// 写入32位寄存器
    fn write_reg(&mut self, offset: usize, value: u32);
}

/// Virtio MMIO 设备
pub struct VirtioMmio {
    base_addr: usize,
}

impl VirtioMmio {
    /// 创建新的Virtio MMIO设备实例
    ///
    /// # Safety
    ///
    /// `base_addr` 必须是一个 virtio-mmio 寄存器窗口的物理地址，且整个程序中
    /// 只能有一个实例访问它。
    pub const unsafe fn new(base_addr: usize) -> Self {
        Self { base_addr }
    }
}

impl RegisterAccess for VirtioMmio {
    fn read_reg(&self, offset: usize) -> u32 {
        // SAFETY: new() 的调用者保证窗口有效且独占
        unsafe { ptr::read_volatile((self.base_addr + offset) as *const u32) }
    }

    fn write_reg(&mut self, offset: usize, value: u32) {
        // SAFETY: 同上
        unsafe { ptr::write_volatile((self.base_addr + offset) as *mut u32, value) }
    }
}

// 声明子模块
pub mod blk;
pub mod error;
pub mod queue;

// 重新导出子模块的类型
pub use blk::VirtioBlk;
pub use error::{Result, VirtioError};
pub use queue::{QueueMemory, QUEUE_SIZE};
