// library/abboot/src/kernel/error.rs
use crate::virtio::VirtioError;

/// 内核加载错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// 读内核时传输层出错
    Transport(VirtioError),
    /// 头部 magic 不是 "ARM\x64"
    BadMagic(u32),
    TooLarge { size: u64, max: usize },
    EmptyImage,
    Truncated,
    BufferTooSmall { needed: usize, actual: usize },
}

impl From<VirtioError> for LoadError {
    fn from(err: VirtioError) -> Self {
        LoadError::Transport(err)
    }
}

impl core::fmt::Display for LoadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LoadError::Transport(e) => write!(f, "Virtio error: {}", e),
            LoadError::BadMagic(magic) => {
                write!(f, "Invalid kernel header magic: 0x{:08x}", magic)
            }
            LoadError::TooLarge { size, max } => {
                write!(f, "Kernel too large: {} > {} bytes", size, max)
            }
            LoadError::EmptyImage => write!(f, "Kernel image size is zero"),
            LoadError::Truncated => write!(f, "Kernel header truncated"),
            LoadError::BufferTooSmall { needed, actual } => {
                write!(f, "Load region too small: {} < {} bytes", actual, needed)
            }
        }
    }
}

impl core::error::Error for LoadError {}

/// 设备树错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtbError {
    BadMagic(u32),
    UnsupportedVersion(u32),
    /// 头部或块越过了 blob 的边界
    Truncated,
    /// 结构块里的 token 序列不合法
    Malformed,
    /// 目标区域放不下修改后的设备树
    NoSpace { needed: usize, available: usize },
}

impl core::fmt::Display for DtbError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DtbError::BadMagic(magic) => write!(f, "Invalid DTB magic: 0x{:08x}", magic),
            DtbError::UnsupportedVersion(v) => write!(f, "Unsupported DTB version {}", v),
            DtbError::Truncated => write!(f, "DTB truncated"),
            DtbError::Malformed => write!(f, "DTB structure block malformed"),
            DtbError::NoSpace { needed, available } => {
                write!(f, "No space for DTB: {} > {} bytes", needed, available)
            }
        }
    }
}

impl core::error::Error for DtbError {}
