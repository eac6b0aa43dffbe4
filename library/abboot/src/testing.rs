//! 测试用的模拟硬件：virtio-blk 设备、平台和设备树构造器

use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use crate::platform::Platform;
use crate::virtio::blk::config::{
    SECTOR_SIZE, VIRTIO_BLK_S_IOERR, VIRTIO_BLK_S_OK, VIRTIO_BLK_S_UNSUPP, VIRTIO_BLK_T_IN,
    VIRTIO_BLK_T_OUT,
};
use crate::virtio::queue::{AvailableRing, BlkReqHeader, Descriptor, UsedElem, UsedRing};
use crate::virtio::queue::{VIRTQ_DESC_F_NEXT, VIRTQ_DESC_F_WRITE};
use crate::virtio::*;

/// 模拟设备记录下的一次请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub type_: u32,
    pub sector: u64,
    pub len: u32,
    pub descriptors: Vec<Descriptor>,
    pub status: u8,
}

pub struct FakeState {
    pub magic: u32,
    pub version: u32,
    pub device_id: u32,
    pub vendor_id: u32,
    pub device_features: [u32; 2],
    pub driver_features: [u32; 2],
    pub device_features_sel: u32,
    pub driver_features_sel: u32,
    pub status: u32,
    pub status_writes: Vec<u32>,
    pub reject_features: bool,
    pub queue_sel: u32,
    pub queue_num_max: u32,
    pub queue_num: u32,
    pub queue_ready: u32,
    /// 复位后 QUEUE_READY 仍为 1（队列被别人占用）
    pub queue_busy: bool,
    pub desc_addr: u64,
    pub driver_addr: u64,
    pub device_addr: u64,
    pub last_avail: u16,
    pub disk: Vec<u8>,
    pub requests: Vec<RecordedRequest>,
    /// 下一次请求强制返回的状态
    pub fail_next: Option<u8>,
    /// 所有写请求返回 IOERR
    pub fail_writes: bool,
}

/// 模拟 virtio-blk MMIO 设备；克隆后共享同一个状态，便于测试检查
#[derive(Clone)]
pub struct FakeVirtioBlk {
    state: Rc<RefCell<FakeState>>,
}

impl FakeVirtioBlk {
    pub fn new(disk_sectors: usize) -> Self {
        Self::with_disk(vec![0u8; disk_sectors * SECTOR_SIZE])
    }

    pub fn with_disk(disk: Vec<u8>) -> Self {
        let state = FakeState {
            magic: VIRTIO_MAGIC,
            version: VIRTIO_MMIO_VERSION_MODERN,
            device_id: VIRTIO_DEVICE_ID_BLOCK,
            vendor_id: VIRTIO_VENDOR_QEMU,
            // SEG_MAX | RO | SCSI | FLUSH | MQ | EVENT_IDX | INDIRECT ; VERSION_1 | ACCESS_PLATFORM
            device_features: [(1 << 2) | (1 << 5) | (1 << 7) | (1 << 9) | (1 << 12) | (1 << 28) | (1 << 29), 0b11],
            driver_features: [0; 2],
            device_features_sel: 0,
            driver_features_sel: 0,
            status: 0,
            status_writes: Vec::new(),
            reject_features: false,
            queue_sel: 0,
            queue_num_max: 256,
            queue_num: 0,
            queue_ready: 0,
            queue_busy: false,
            desc_addr: 0,
            driver_addr: 0,
            device_addr: 0,
            last_avail: 0,
            disk,
            requests: Vec::new(),
            fail_next: None,
            fail_writes: false,
        };
        Self { state: Rc::new(RefCell::new(state)) }
    }

    pub fn state(&self) -> std::cell::RefMut<'_, FakeState> {
        self.state.borrow_mut()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.borrow().requests.clone()
    }

    pub fn disk(&self) -> Vec<u8> {
        self.state.borrow().disk.clone()
    }

    pub fn write_disk(&self, offset: usize, bytes: &[u8]) {
        self.state.borrow_mut().disk[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// 处理可用环上所有新的描述符链
    fn process_queue(state: &mut FakeState) {
        let desc = state.desc_addr as *const Descriptor;
        let avail = state.driver_addr as *const AvailableRing;
        let used = state.device_addr as *mut UsedRing;
        let num = state.queue_num as u16;

        // SAFETY: 驱动编程的地址指向测试里存活的 QueueMemory 和缓冲区
        unsafe {
            let avail_idx = core::ptr::read_volatile(&(*avail).idx);
            while state.last_avail != avail_idx {
                let head = (*avail).ring[(state.last_avail % num) as usize];
                let mut chain = Vec::new();
                let mut index = head;
                loop {
                    let d = core::ptr::read_volatile(desc.add(index as usize));
                    chain.push(d);
                    if d.flags & VIRTQ_DESC_F_NEXT == 0 {
                        break;
                    }
                    index = d.next;
                }

                let header = core::ptr::read_volatile(chain[0].addr as *const BlkReqHeader);
                let data = chain[1];
                let status_desc = chain[chain.len() - 1];
                let offset = header.sector as usize * SECTOR_SIZE;
                let end = offset + data.len as usize;

                let status = if let Some(forced) = state.fail_next.take() {
                    forced
                } else if state.fail_writes && header.type_ == VIRTIO_BLK_T_OUT {
                    VIRTIO_BLK_S_IOERR
                } else if end > state.disk.len() {
                    VIRTIO_BLK_S_IOERR
                } else if header.type_ == VIRTIO_BLK_T_IN && data.flags & VIRTQ_DESC_F_WRITE != 0 {
                    core::ptr::copy_nonoverlapping(
                        state.disk[offset..end].as_ptr(),
                        data.addr as *mut u8,
                        data.len as usize,
                    );
                    VIRTIO_BLK_S_OK
                } else if header.type_ == VIRTIO_BLK_T_OUT && data.flags & VIRTQ_DESC_F_WRITE == 0 {
                    core::ptr::copy_nonoverlapping(
                        data.addr as *const u8,
                        state.disk[offset..end].as_mut_ptr(),
                        data.len as usize,
                    );
                    VIRTIO_BLK_S_OK
                } else {
                    VIRTIO_BLK_S_UNSUPP
                };

                core::ptr::write_volatile(status_desc.addr as *mut u8, status);

                let used_idx = core::ptr::read_volatile(&(*used).idx);
                (*used).ring[(used_idx % num) as usize] = UsedElem { id: head as u32, len: data.len };
                core::ptr::write_volatile(&mut (*used).idx, used_idx.wrapping_add(1));

                state.requests.push(RecordedRequest {
                    type_: header.type_,
                    sector: header.sector,
                    len: data.len,
                    descriptors: chain,
                    status,
                });
                state.last_avail = state.last_avail.wrapping_add(1);
            }
        }
    }
}

impl RegisterAccess for FakeVirtioBlk {
    fn read_reg(&self, offset: usize) -> u32 {
        let s = self.state.borrow();
        let capacity = (s.disk.len() / SECTOR_SIZE) as u64;
        match offset {
            VIRTIO_MAGIC_VALUE => s.magic,
            VIRTIO_VERSION => s.version,
            VIRTIO_DEVICE_ID => s.device_id,
            VIRTIO_VENDOR_ID => s.vendor_id,
            VIRTIO_DEVICE_FEATURES => s.device_features[s.device_features_sel as usize & 1],
            VIRTIO_QUEUE_NUM_MAX => s.queue_num_max,
            VIRTIO_QUEUE_READY => s.queue_ready,
            VIRTIO_STATUS => s.status,
            VIRTIO_CONFIG => capacity as u32,
            o if o == VIRTIO_CONFIG + 4 => (capacity >> 32) as u32,
            _ => 0,
        }
    }

    fn write_reg(&mut self, offset: usize, value: u32) {
        let mut s = self.state.borrow_mut();
        match offset {
            VIRTIO_DEVICE_FEATURES_SEL => s.device_features_sel = value,
            VIRTIO_DRIVER_FEATURES_SEL => s.driver_features_sel = value,
            VIRTIO_DRIVER_FEATURES => {
                let sel = s.driver_features_sel as usize & 1;
                s.driver_features[sel] = value;
            }
            VIRTIO_STATUS => {
                s.status_writes.push(value);
                let mut value = value;
                if s.reject_features {
                    value &= !crate::virtio::error::status::VIRTIO_STATUS_FEATURES_OK;
                }
                s.status = value;
                if value == 0 {
                    s.queue_ready = s.queue_busy as u32;
                }
            }
            VIRTIO_QUEUE_SEL => s.queue_sel = value,
            VIRTIO_QUEUE_NUM => s.queue_num = value,
            VIRTIO_QUEUE_READY => s.queue_ready = value,
            VIRTIO_QUEUE_DESC_LOW => s.desc_addr = (s.desc_addr & !0xFFFF_FFFF) | value as u64,
            VIRTIO_QUEUE_DESC_HIGH => s.desc_addr = (s.desc_addr & 0xFFFF_FFFF) | (value as u64) << 32,
            VIRTIO_QUEUE_DRIVER_LOW => s.driver_addr = (s.driver_addr & !0xFFFF_FFFF) | value as u64,
            VIRTIO_QUEUE_DRIVER_HIGH => {
                s.driver_addr = (s.driver_addr & 0xFFFF_FFFF) | (value as u64) << 32
            }
            VIRTIO_QUEUE_DEVICE_LOW => s.device_addr = (s.device_addr & !0xFFFF_FFFF) | value as u64,
            VIRTIO_QUEUE_DEVICE_HIGH => {
                s.device_addr = (s.device_addr & 0xFFFF_FFFF) | (value as u64) << 32
            }
            VIRTIO_QUEUE_NOTIFY => Self::process_queue(&mut s),
            _ => {}
        }
    }
}

/// 测试平台调用记录
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlatformLog {
    pub timer_enabled: bool,
    pub powered_off: bool,
    pub jump: Option<(usize, usize)>,
}

/// 模拟平台：跳转和关机都以 panic 结束，测试用 catch_unwind 观察
pub struct FakePlatform {
    pub el: u8,
    pub log: Rc<RefCell<PlatformLog>>,
}

impl FakePlatform {
    pub fn new(el: u8) -> Self {
        Self { el, log: Rc::new(RefCell::new(PlatformLog::default())) }
    }
}

impl Platform for FakePlatform {
    fn current_el(&self) -> u8 {
        self.el
    }

    fn enable_timer_access(&mut self) {
        self.log.borrow_mut().timer_enabled = true;
    }

    fn power_off(&mut self) -> ! {
        self.log.borrow_mut().powered_off = true;
        panic!("power off");
    }

    unsafe fn jump_to_kernel(&mut self, entry: usize, dtb: usize) -> ! {
        self.log.borrow_mut().jump = Some((entry, dtb));
        panic!("jump to kernel");
    }
}

/// 构造 arm64 Image 头
pub fn kernel_header(image_size: u64) -> [u8; 64] {
    let mut header = [0u8; 64];
    header[0..4].copy_from_slice(&0x9100_5a4du32.to_le_bytes()); // add x13, x18, #0x16
    header[8..16].copy_from_slice(&0x8_0000u64.to_le_bytes());
    header[16..24].copy_from_slice(&image_size.to_le_bytes());
    header[24..32].copy_from_slice(&0xAu64.to_le_bytes());
    header[56..60].copy_from_slice(b"ARM\x64");
    header
}

/// 最小 FDT (v17) 构造器
pub struct DtbBuilder {
    structs: Vec<u8>,
    strings: Vec<u8>,
}

impl DtbBuilder {
    pub fn new() -> Self {
        Self { structs: Vec::new(), strings: Vec::new() }
    }

    fn token(&mut self, token: u32) {
        self.structs.extend_from_slice(&token.to_be_bytes());
    }

    fn pad(&mut self) {
        while self.structs.len() % 4 != 0 {
            self.structs.push(0);
        }
    }

    pub fn begin_node(&mut self, name: &str) -> &mut Self {
        self.token(1);
        self.structs.extend_from_slice(name.as_bytes());
        self.structs.push(0);
        self.pad();
        self
    }

    pub fn end_node(&mut self) -> &mut Self {
        self.token(2);
        self
    }

    pub fn prop(&mut self, name: &str, value: &[u8]) -> &mut Self {
        let nameoff = match find_subslice(&self.strings, name) {
            Some(off) => off,
            None => {
                let off = self.strings.len();
                self.strings.extend_from_slice(name.as_bytes());
                self.strings.push(0);
                off
            }
        };
        self.token(3);
        self.structs.extend_from_slice(&(value.len() as u32).to_be_bytes());
        self.structs.extend_from_slice(&(nameoff as u32).to_be_bytes());
        self.structs.extend_from_slice(value);
        self.pad();
        self
    }

    pub fn prop_str(&mut self, name: &str, value: &str) -> &mut Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.prop(name, &bytes)
    }

    pub fn build(&mut self) -> Vec<u8> {
        self.token(9);
        let rsvmap_off = 40usize;
        let struct_off = rsvmap_off + 16;
        let strings_off = struct_off + self.structs.len();
        let total = strings_off + self.strings.len();

        let mut blob = Vec::with_capacity(total);
        for field in [
            crate::kernel::dtb::FDT_MAGIC,
            total as u32,
            struct_off as u32,
            strings_off as u32,
            rsvmap_off as u32,
            17,
            16,
            0,
            self.strings.len() as u32,
            self.structs.len() as u32,
        ] {
            blob.extend_from_slice(&field.to_be_bytes());
        }
        blob.extend_from_slice(&[0u8; 16]);
        blob.extend_from_slice(&self.structs);
        blob.extend_from_slice(&self.strings);
        blob
    }
}

fn find_subslice(strings: &[u8], name: &str) -> Option<usize> {
    let mut needle = name.as_bytes().to_vec();
    needle.push(0);
    strings.windows(needle.len()).position(|w| w == needle.as_slice())
}

/// QEMU virt 风格的设备树，可选带 /chosen 和 bootargs
pub fn sample_dtb(chosen: bool, bootargs: Option<&str>) -> Vec<u8> {
    let mut b = DtbBuilder::new();
    b.begin_node("")
        .prop("#address-cells", &2u32.to_be_bytes())
        .prop("#size-cells", &2u32.to_be_bytes())
        .prop_str("compatible", "linux,dummy-virt");
    if chosen {
        b.begin_node("chosen");
        if let Some(args) = bootargs {
            b.prop_str("bootargs", args);
        }
        b.prop_str("stdout-path", "/pl011@9000000");
        b.end_node();
    }
    b.begin_node("memory@40000000")
        .prop_str("device_type", "memory")
        .prop("reg", &[0, 0, 0, 0, 0x40, 0, 0, 0, 0, 0, 0, 0, 0x10, 0, 0, 0])
        .end_node();
    b.end_node();
    b.build()
}
