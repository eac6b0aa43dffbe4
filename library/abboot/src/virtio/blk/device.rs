// 📄 virtio/blk/device.rs
//! Virtio-blk块设备驱动核心功能 - modern (v2) MMIO 模式
//!
//! 同步、轮询、单请求：每个请求是一条 3 个描述符的链（请求头 → 数据 → 状态），
//! 提交后自旋等待状态字节离开哨兵值。

use core::hint::spin_loop;
use core::marker::PhantomData;
use core::sync::atomic::{fence, Ordering};

use log::{debug, info, trace, warn};

use super::config::*;
use crate::virtio::error::status::*;
use crate::virtio::error::{Result, VirtioError};
use crate::virtio::queue::{
    Descriptor, QueueMemory, QueuePtr, QUEUE_SIZE, VIRTQ_DESC_F_NEXT, VIRTQ_DESC_F_WRITE,
};
use crate::virtio::*;

/// Virtio-blk设备结构
///
/// `'q` 是独占队列内存的生命周期；设备存活期间没有别人能碰这块内存。
pub struct VirtioBlk<'q, R: RegisterAccess> {
    regs: R,
    queue: QueuePtr,
    capacity: u64,
    last_used_idx: u16,
    _memory: PhantomData<&'q mut QueueMemory>,
}

impl<'q, R: RegisterAccess> VirtioBlk<'q, R> {
    /// 创建设备实例，尚未与设备握手
    pub fn new(regs: R, memory: &'q mut QueueMemory) -> Self {
        Self {
            regs,
            queue: QueuePtr(memory as *mut QueueMemory),
            capacity: 0,
            last_used_idx: 0,
            _memory: PhantomData,
        }
    }

    /// 设备容量（扇区数），init 之后有效
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// 验证设备身份
    fn verify_device(&self) -> Result<()> {
        let magic = self.regs.read_reg(VIRTIO_MAGIC_VALUE);
        if magic != VIRTIO_MAGIC {
            return Err(VirtioError::InvalidMagic(magic));
        }
        let version = self.regs.read_reg(VIRTIO_VERSION);
        if version != VIRTIO_MMIO_VERSION_MODERN {
            return Err(VirtioError::UnsupportedVersion(version));
        }
        let device_id = self.regs.read_reg(VIRTIO_DEVICE_ID);
        if device_id != VIRTIO_DEVICE_ID_BLOCK {
            return Err(VirtioError::UnsupportedDevice(device_id));
        }
        let vendor = self.regs.read_reg(VIRTIO_VENDOR_ID);
        if vendor != VIRTIO_VENDOR_QEMU {
            return Err(VirtioError::UnsupportedVendor(vendor));
        }
        Ok(())
    }

    /// 特性协商：低32位去掉不支持的特性，高32位只保留 VERSION_1
    fn negotiate_features(&mut self) -> Result<()> {
        self.regs.write_reg(VIRTIO_DEVICE_FEATURES_SEL, 0);
        let low = self.regs.read_reg(VIRTIO_DEVICE_FEATURES) & !UNSUPPORTED_FEATURES_LOW;
        self.regs.write_reg(VIRTIO_DRIVER_FEATURES_SEL, 0);
        self.regs.write_reg(VIRTIO_DRIVER_FEATURES, low);

        self.regs.write_reg(VIRTIO_DEVICE_FEATURES_SEL, 1);
        let high = self.regs.read_reg(VIRTIO_DEVICE_FEATURES) & SUPPORTED_FEATURES_HIGH;
        self.regs.write_reg(VIRTIO_DRIVER_FEATURES_SEL, 1);
        self.regs.write_reg(VIRTIO_DRIVER_FEATURES, high);
        debug!("virtio-blk: features low=0x{:08x} high=0x{:08x}", low, high);

        let status = VIRTIO_STATUS_ACKNOWLEDGE | VIRTIO_STATUS_DRIVER | VIRTIO_STATUS_FEATURES_OK;
        self.regs.write_reg(VIRTIO_STATUS, status);
        if self.regs.read_reg(VIRTIO_STATUS) & VIRTIO_STATUS_FEATURES_OK == 0 {
            self.regs.write_reg(VIRTIO_STATUS, VIRTIO_STATUS_FAILED);
            return Err(VirtioError::FeaturesNegotiationFailed);
        }
        Ok(())
    }

    /// 配置队列 0
    fn setup_queue(&mut self) -> Result<()> {
        self.regs.write_reg(VIRTIO_QUEUE_SEL, 0);
        if self.regs.read_reg(VIRTIO_QUEUE_READY) != 0 {
            return Err(VirtioError::QueueInUse);
        }
        let max = self.regs.read_reg(VIRTIO_QUEUE_NUM_MAX);
        if (max as usize) < QUEUE_SIZE {
            return Err(VirtioError::QueueTooSmall(max));
        }
        self.regs.write_reg(VIRTIO_QUEUE_NUM, QUEUE_SIZE as u32);

        self.queue.reset_avail();
        self.last_used_idx = self.queue.used_idx();

        let desc = self.queue.desc_addr();
        let avail = self.queue.avail_addr();
        let used = self.queue.used_addr();
        self.regs.write_reg(VIRTIO_QUEUE_DESC_LOW, desc as u32);
        self.regs.write_reg(VIRTIO_QUEUE_DESC_HIGH, (desc >> 32) as u32);
        self.regs.write_reg(VIRTIO_QUEUE_DRIVER_LOW, avail as u32);
        self.regs.write_reg(VIRTIO_QUEUE_DRIVER_HIGH, (avail >> 32) as u32);
        self.regs.write_reg(VIRTIO_QUEUE_DEVICE_LOW, used as u32);
        self.regs.write_reg(VIRTIO_QUEUE_DEVICE_HIGH, (used >> 32) as u32);

        self.regs.write_reg(VIRTIO_QUEUE_READY, 1);
        Ok(())
    }

    /// 设备初始化：验证 → 复位 → ACK/DRIVER → 特性协商 → 队列 → DRIVER_OK
    pub fn init(&mut self) -> Result<()> {
        self.verify_device()?;

        self.regs.write_reg(VIRTIO_STATUS, 0);
        self.regs.write_reg(VIRTIO_STATUS, VIRTIO_STATUS_ACKNOWLEDGE);
        self.regs
            .write_reg(VIRTIO_STATUS, VIRTIO_STATUS_ACKNOWLEDGE | VIRTIO_STATUS_DRIVER);

        self.negotiate_features()?;
        self.setup_queue()?;

        let status = self.regs.read_reg(VIRTIO_STATUS);
        self.regs.write_reg(VIRTIO_STATUS, status | VIRTIO_STATUS_DRIVER_OK);

        let low = self.regs.read_reg(VIRTIO_BLK_CONFIG_CAPACITY_LOW) as u64;
        let high = self.regs.read_reg(VIRTIO_BLK_CONFIG_CAPACITY_HIGH) as u64;
        self.capacity = (high << 32) | low;
        info!("virtio-blk: ready, {} sectors", self.capacity);
        Ok(())
    }

    /// 从 `lba` 开始读取 `buf.len()` 字节，返回读到的字节数
    pub fn read(&mut self, lba: u64, buf: &mut [u8]) -> Result<usize> {
        self.submit(VIRTIO_BLK_T_IN, lba, buf.as_mut_ptr() as u64, buf.len())
    }

    /// 把 `buf` 写到 `lba` 开始的扇区，返回写入的字节数
    pub fn write(&mut self, lba: u64, buf: &[u8]) -> Result<usize> {
        self.submit(VIRTIO_BLK_T_OUT, lba, buf.as_ptr() as u64, buf.len())
    }

    fn check_request(&self, lba: u64, len: usize) -> Result<()> {
        if len == 0 || len % SECTOR_SIZE != 0 || len > u32::MAX as usize {
            return Err(VirtioError::InvalidLength(len));
        }
        let sectors = (len / SECTOR_SIZE) as u64;
        match lba.checked_add(sectors) {
            Some(end) if end <= self.capacity => Ok(()),
            _ => Err(VirtioError::CapacityExceeded { lba, sectors, capacity: self.capacity }),
        }
    }

    fn submit(&mut self, type_: u32, lba: u64, data: u64, len: usize) -> Result<usize> {
        self.check_request(lba, len)?;
        trace!("virtio-blk: type {} lba {} len {}", type_, lba, len);

        let q = self.queue;
        q.set_request(type_, lba);

        let data_flags = if type_ == VIRTIO_BLK_T_IN {
            VIRTQ_DESC_F_NEXT | VIRTQ_DESC_F_WRITE
        } else {
            VIRTQ_DESC_F_NEXT
        };
        q.set_descriptor(
            0,
            Descriptor { addr: q.req_addr(), len: 16, flags: VIRTQ_DESC_F_NEXT, next: 1 },
        );
        q.set_descriptor(1, Descriptor { addr: data, len: len as u32, flags: data_flags, next: 2 });
        q.set_descriptor(
            2,
            Descriptor { addr: q.status_addr(), len: 1, flags: VIRTQ_DESC_F_WRITE, next: 0 },
        );
        q.set_status(VIRTIO_BLK_S_PENDING);

        q.push_avail(0);
        fence(Ordering::SeqCst);
        self.regs.write_reg(VIRTIO_QUEUE_NOTIFY, 0);

        let status = loop {
            fence(Ordering::SeqCst);
            let status = q.status();
            if status != VIRTIO_BLK_S_PENDING {
                break status;
            }
            spin_loop();
        };
        let used = q.used_idx();
        if used == self.last_used_idx {
            debug!("virtio-blk: status written before used ring advanced");
        }
        self.last_used_idx = used;

        if status != VIRTIO_BLK_S_OK {
            warn!("virtio-blk: request at lba {} failed, status {}", lba, status);
            return Err(VirtioError::RequestFailed(status));
        }
        Ok(len)
    }
}
