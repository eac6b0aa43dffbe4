// library/abboot/src/virtio/queue.rs
//! Split virtqueue 的静态内存布局
//!
//! 描述符表、可用环、已用环以及请求头/状态字节放在同一块静态内存里，
//! 由传输层独占。布局遵循 virtio 1.1 规范（desc 16 字节对齐，avail 2 字节，
//! used 4 字节）。

use core::ptr::{self, addr_of, addr_of_mut};
use core::sync::atomic::{AtomicBool, Ordering};

/// 队列大小（描述符个数），必须是2的幂
pub const QUEUE_SIZE: usize = 8;

/// Virtio描述符标志常量
pub const VIRTQ_DESC_F_NEXT: u16 = 0x1; // 还有下一个描述符
pub const VIRTQ_DESC_F_WRITE: u16 = 0x2; // 设备可写入

/// Virtqueue描述符 - 强制16字节对齐
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Descriptor {
    pub addr: u64,  // 物理地址
    pub len: u32,   // 缓冲区长度
    pub flags: u16, // 描述符标志
    pub next: u16,  // 下一个描述符索引
}

/// 可用环结构
#[repr(C, align(2))]
pub struct AvailableRing {
    pub flags: u16,
    pub idx: u16,
    pub ring: [u16; QUEUE_SIZE],
    pub used_event: u16,
}

/// 已用环元素
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct UsedElem {
    pub id: u32,  // 描述符索引
    pub len: u32, // 写入的数据长度
}

/// 已用环结构
#[repr(C, align(4))]
pub struct UsedRing {
    pub flags: u16,
    pub idx: u16,
    pub ring: [UsedElem; QUEUE_SIZE],
    pub avail_event: u16,
}

/// Virtio-blk请求头
#[repr(C, align(16))]
pub struct BlkReqHeader {
    pub type_: u32,
    pub reserved: u32,
    pub sector: u64,
}

/// 传输层独占的共享内存
#[repr(C, align(4096))]
pub struct QueueMemory {
    pub desc: [Descriptor; QUEUE_SIZE],
    pub avail: AvailableRing,
    pub used: UsedRing,
    pub req: BlkReqHeader,
    pub status: u8,
}

static QUEUE_TAKEN: AtomicBool = AtomicBool::new(false);
static mut QUEUE_MEMORY: QueueMemory = QueueMemory::new();

impl QueueMemory {
    pub const fn new() -> Self {
        const EMPTY: Descriptor = Descriptor { addr: 0, len: 0, flags: 0, next: 0 };
        const EMPTY_USED: UsedElem = UsedElem { id: 0, len: 0 };
        Self {
            desc: [EMPTY; QUEUE_SIZE],
            avail: AvailableRing { flags: 0, idx: 0, ring: [0; QUEUE_SIZE], used_event: 0 },
            used: UsedRing { flags: 0, idx: 0, ring: [EMPTY_USED; QUEUE_SIZE], avail_event: 0 },
            req: BlkReqHeader { type_: 0, reserved: 0, sector: 0 },
            status: 0,
        }
    }

    /// 取得静态队列内存，整个程序只能成功一次
    ///
    /// 单核、无中断环境，不需要原子读改写。
    pub fn take() -> Option<&'static mut QueueMemory> {
        if QUEUE_TAKEN.load(Ordering::Acquire) {
            return None;
        }
        QUEUE_TAKEN.store(true, Ordering::Release);
        // SAFETY: QUEUE_TAKEN 保证这个可变引用只会被交出一次
        Some(unsafe { &mut *(&raw mut QUEUE_MEMORY) })
    }
}

impl Default for QueueMemory {
    fn default() -> Self {
        Self::new()
    }
}

/// 以裸指针方式访问队列内存，所有读写都是 volatile 的
///
/// 设备会在驱动背后修改 used 环和状态字节，因此这里不能持有普通引用。
#[derive(Clone, Copy)]
pub(crate) struct QueuePtr(pub(crate) *mut QueueMemory);

impl QueuePtr {
    pub(crate) fn desc_addr(self) -> u64 {
        // SAFETY: self.0 指向有效的 QueueMemory
        unsafe { addr_of!((*self.0).desc) as u64 }
    }

    pub(crate) fn avail_addr(self) -> u64 {
        unsafe { addr_of!((*self.0).avail) as u64 }
    }

    pub(crate) fn used_addr(self) -> u64 {
        unsafe { addr_of!((*self.0).used) as u64 }
    }

    pub(crate) fn req_addr(self) -> u64 {
        unsafe { addr_of!((*self.0).req) as u64 }
    }

    pub(crate) fn status_addr(self) -> u64 {
        unsafe { addr_of!((*self.0).status) as u64 }
    }

    pub(crate) fn set_descriptor(self, index: usize, desc: Descriptor) {
        debug_assert!(index < QUEUE_SIZE);
        unsafe { ptr::write_volatile(addr_of_mut!((*self.0).desc[index]), desc) }
    }

    pub(crate) fn set_request(self, type_: u32, sector: u64) {
        unsafe {
            ptr::write_volatile(addr_of_mut!((*self.0).req.type_), type_);
            ptr::write_volatile(addr_of_mut!((*self.0).req.reserved), 0);
            ptr::write_volatile(addr_of_mut!((*self.0).req.sector), sector);
        }
    }

    pub(crate) fn set_status(self, value: u8) {
        unsafe { ptr::write_volatile(addr_of_mut!((*self.0).status), value) }
    }

    pub(crate) fn status(self) -> u8 {
        unsafe { ptr::read_volatile(addr_of!((*self.0).status)) }
    }

    pub(crate) fn reset_avail(self) {
        unsafe {
            ptr::write_volatile(addr_of_mut!((*self.0).avail.flags), 0);
            ptr::write_volatile(addr_of_mut!((*self.0).avail.idx), 0);
        }
    }

    pub(crate) fn avail_idx(self) -> u16 {
        unsafe { ptr::read_volatile(addr_of!((*self.0).avail.idx)) }
    }

    /// 把描述符链头放入可用环并推进索引
    pub(crate) fn push_avail(self, head: u16) {
        let idx = self.avail_idx();
        let slot = idx as usize & (QUEUE_SIZE - 1);
        unsafe {
            ptr::write_volatile(addr_of_mut!((*self.0).avail.ring[slot]), head);
            // 环内容必须先于索引对设备可见
            core::sync::atomic::fence(Ordering::SeqCst);
            ptr::write_volatile(addr_of_mut!((*self.0).avail.idx), idx.wrapping_add(1));
        }
    }

    pub(crate) fn used_idx(self) -> u16 {
        unsafe { ptr::read_volatile(addr_of!((*self.0).used.idx)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{align_of, offset_of, size_of};

    #[test]
    fn test_layout_matches_virtio_alignment() {
        assert_eq!(size_of::<Descriptor>(), 16);
        assert_eq!(size_of::<BlkReqHeader>(), 16);
        assert_eq!(offset_of!(QueueMemory, desc) % 16, 0);
        assert_eq!(offset_of!(QueueMemory, avail) % 2, 0);
        assert_eq!(offset_of!(QueueMemory, used) % 4, 0);
        assert_eq!(align_of::<QueueMemory>(), 4096);
    }

    #[test]
    fn test_push_avail_wraps_ring_slot() {
        let mut memory = QueueMemory::new();
        let queue = QueuePtr(&mut memory);
        for _ in 0..QUEUE_SIZE + 3 {
            queue.push_avail(0);
        }
        assert_eq!(queue.avail_idx(), (QUEUE_SIZE + 3) as u16);

        unsafe { ptr::write_volatile(addr_of_mut!((*queue.0).avail.idx), u16::MAX) };
        queue.push_avail(5);
        assert_eq!(queue.avail_idx(), 0);
        assert_eq!(memory.avail.ring[QUEUE_SIZE - 1], 5);
    }
}
