// library/abboot/src/kernel/header.rs
//! arm64 Linux Image 头（Documentation/arch/arm64/booting.rst）

use super::LoadError;

/// "ARM\x64"，小端
pub const ARM64_IMAGE_MAGIC: u32 = 0x644d_5241;
pub const KERNEL_HEADER_SIZE: usize = 64;

/// 64 字节的 Image 头，所有字段小端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelHeader {
    pub code0: u32,
    pub code1: u32,
    pub text_offset: u64,
    pub image_size: u64,
    pub flags: u64,
    pub res2: u64,
    pub res3: u64,
    pub res4: u64,
    pub magic: u32,
    pub res5: u32,
}

fn le32(bytes: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

fn le64(bytes: &[u8], off: usize) -> u64 {
    (le32(bytes, off + 4) as u64) << 32 | le32(bytes, off) as u64
}

impl KernelHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, LoadError> {
        if bytes.len() < KERNEL_HEADER_SIZE {
            return Err(LoadError::Truncated);
        }
        Ok(Self {
            code0: le32(bytes, 0),
            code1: le32(bytes, 4),
            text_offset: le64(bytes, 8),
            image_size: le64(bytes, 16),
            flags: le64(bytes, 24),
            res2: le64(bytes, 32),
            res3: le64(bytes, 40),
            res4: le64(bytes, 48),
            magic: le32(bytes, 56),
            res5: le32(bytes, 60),
        })
    }

    /// 检查 magic 和大小上限，返回镜像字节数
    pub fn validate(&self, max_size: usize) -> Result<usize, LoadError> {
        if self.magic != ARM64_IMAGE_MAGIC {
            return Err(LoadError::BadMagic(self.magic));
        }
        if self.image_size == 0 {
            return Err(LoadError::EmptyImage);
        }
        if self.image_size > max_size as u64 {
            return Err(LoadError::TooLarge { size: self.image_size, max: max_size });
        }
        Ok(self.image_size as usize)
    }

    /// flags bit 0：内核是大端
    pub fn is_big_endian(&self) -> bool {
        self.flags & 1 != 0
    }

    /// flags bit 1-2：内核页大小（0 表示未指定）
    pub fn page_size_shift(&self) -> Option<u32> {
        match (self.flags >> 1) & 0b11 {
            1 => Some(12),
            2 => Some(14),
            3 => Some(16),
            _ => None,
        }
    }
}
