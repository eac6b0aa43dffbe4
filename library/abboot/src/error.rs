// library/abboot/src/error.rs
use crate::env::EnvError;
use crate::kernel::{DtbError, LoadError};
use crate::virtio::VirtioError;

/// 引导终止原因
///
/// 只有 [`crate::boot`] 会构造它：下层模块返回各自的错误，是否致命在那里决定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalError {
    /// 当前异常级别无法驱动设备
    UnsupportedEl(u8),
    /// 设备签名或握手失败
    Virtio(VirtioError),
    /// 第一次读取环境区失败
    EnvRead(VirtioError),
    /// 分配区放不下环境区
    EnvBuffer(EnvError),
    Kernel(LoadError),
    Dtb(DtbError),
}

impl From<VirtioError> for FatalError {
    fn from(err: VirtioError) -> Self {
        FatalError::Virtio(err)
    }
}

impl From<LoadError> for FatalError {
    fn from(err: LoadError) -> Self {
        FatalError::Kernel(err)
    }
}

impl From<DtbError> for FatalError {
    fn from(err: DtbError) -> Self {
        FatalError::Dtb(err)
    }
}

impl core::fmt::Display for FatalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FatalError::UnsupportedEl(el) => write!(f, "Unsupported CPU mode EL{}", el),
            FatalError::Virtio(e) => write!(f, "virtio-blk init failed: {}", e),
            FatalError::EnvRead(e) => write!(f, "Failed to read U-Boot environment: {}", e),
            FatalError::EnvBuffer(e) => write!(f, "No room for U-Boot environment: {}", e),
            FatalError::Kernel(e) => write!(f, "Failed to load kernel: {}", e),
            FatalError::Dtb(e) => write!(f, "Failed to prepare device tree: {}", e),
        }
    }
}

impl core::error::Error for FatalError {}
