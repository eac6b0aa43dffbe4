// library/abboot/src/virtio/error.rs
use core::fmt;

/// Virtio 传输层错误类型
///
/// 传输层只报告发生了什么；是否致命由引导编排器决定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtioError {
    // 设备发现和验证错误
    InvalidMagic(u32),
    UnsupportedVersion(u32),
    UnsupportedDevice(u32),
    UnsupportedVendor(u32),

    // 设备初始化错误
    FeaturesNegotiationFailed,
    QueueInUse,
    QueueTooSmall(u32),

    // 请求参数错误
    InvalidLength(usize),
    CapacityExceeded { lba: u64, sectors: u64, capacity: u64 },

    /// 设备写回的非 OK 状态字节
    RequestFailed(u8),
}

impl VirtioError {
    /// 获取错误描述信息
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidMagic(_) => "Invalid Virtio magic value",
            Self::UnsupportedVersion(_) => "Unsupported Virtio version",
            Self::UnsupportedDevice(_) => "Unsupported device type",
            Self::UnsupportedVendor(_) => "Unsupported device vendor",
            Self::FeaturesNegotiationFailed => "Features negotiation failed",
            Self::QueueInUse => "Virtqueue already in use",
            Self::QueueTooSmall(_) => "Virtqueue maximum size too small",
            Self::InvalidLength(_) => "Request length is not a non-zero sector multiple",
            Self::CapacityExceeded { .. } => "Request runs past the end of the disk",
            Self::RequestFailed(_) => "Block request failed",
        }
    }

    /// 与设备状态码对应的负值（非设备错误返回 -1）
    pub fn status_code(&self) -> i32 {
        match self {
            Self::RequestFailed(status) => -(*status as i32),
            _ => -1,
        }
    }
}

impl fmt::Display for VirtioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMagic(v)
            | Self::UnsupportedVersion(v)
            | Self::UnsupportedDevice(v)
            | Self::UnsupportedVendor(v) => write!(f, "{} (0x{:08x})", self.as_str(), v),
            Self::QueueTooSmall(max) => write!(f, "{} ({})", self.as_str(), max),
            Self::InvalidLength(len) => write!(f, "{} ({} bytes)", self.as_str(), len),
            Self::CapacityExceeded { lba, sectors, capacity } => write!(
                f,
                "{}: LBA {} + {} sectors > {}",
                self.as_str(),
                lba,
                sectors,
                capacity
            ),
            Self::RequestFailed(status) => write!(f, "{} (status {})", self.as_str(), status),
            _ => f.write_str(self.as_str()),
        }
    }
}

impl core::error::Error for VirtioError {}

/// Virtio操作结果类型别名
pub type Result<T> = core::result::Result<T, VirtioError>;

/// 设备状态位定义
pub mod status {
    pub const VIRTIO_STATUS_ACKNOWLEDGE: u32 = 1;
    pub const VIRTIO_STATUS_DRIVER: u32 = 2;
    pub const VIRTIO_STATUS_DRIVER_OK: u32 = 4;
    pub const VIRTIO_STATUS_FEATURES_OK: u32 = 8;
    pub const VIRTIO_STATUS_FAILED: u32 = 128;
}
