// library/abboot/src/kernel/loader.rs
//! 从块设备把 Image 读到装载区

use log::{debug, info, warn};

use super::header::{KernelHeader, KERNEL_HEADER_SIZE};
use super::LoadError;
use crate::virtio::blk::SECTOR_SIZE;
use crate::virtio::{RegisterAccess, VirtioBlk};

/// 已装载的内核
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelImage {
    pub header: KernelHeader,
    /// 头部声明的镜像大小
    pub size: usize,
    /// 实际读取的扇区数
    pub sectors: u64,
}

/// 先读第一个扇区校验头部，再一次读完剩下的扇区
///
/// `dest` 的起始地址就是内核的运行地址。
pub fn load_kernel<R: RegisterAccess>(
    blk: &mut VirtioBlk<'_, R>,
    lba: u64,
    dest: &mut [u8],
    max_size: usize,
) -> Result<KernelImage, LoadError> {
    if dest.len() < SECTOR_SIZE {
        return Err(LoadError::BufferTooSmall { needed: SECTOR_SIZE, actual: dest.len() });
    }
    blk.read(lba, &mut dest[..SECTOR_SIZE])?;

    let header = KernelHeader::parse(&dest[..KERNEL_HEADER_SIZE])?;
    let size = header.validate(max_size)?;
    info!(
        "Kernel image: {} bytes, text_offset 0x{:x}, flags 0x{:x}",
        size, header.text_offset, header.flags
    );
    if let Some(shift) = header.page_size_shift() {
        debug!("Kernel page size: {} KiB", (1usize << shift) / 1024);
    }
    if header.is_big_endian() {
        warn!("Kernel image is big-endian");
    }

    let sectors = size.div_ceil(SECTOR_SIZE);
    let span = sectors * SECTOR_SIZE;
    if dest.len() < span {
        return Err(LoadError::BufferTooSmall { needed: span, actual: dest.len() });
    }
    if sectors > 1 {
        debug!("Reading {} more sectors from LBA {}", sectors - 1, lba + 1);
        blk.read(lba + 1, &mut dest[SECTOR_SIZE..span])?;
    }

    Ok(KernelImage { header, size, sectors: sectors as u64 })
}
