// 📄 virtio/blk/config.rs
//! 块设备常量：请求类型、状态码、特性位

/// 扇区大小（字节）
pub const SECTOR_SIZE: usize = 512;

// 请求类型
pub const VIRTIO_BLK_T_IN: u32 = 0; // 读取请求
pub const VIRTIO_BLK_T_OUT: u32 = 1; // 写入请求

// 请求状态
pub const VIRTIO_BLK_S_OK: u8 = 0; // 操作成功
pub const VIRTIO_BLK_S_IOERR: u8 = 1; // 设备I/O错误
pub const VIRTIO_BLK_S_UNSUPP: u8 = 2; // 请求类型不支持
/// 轮询哨兵值，设备不会写出这个状态
pub const VIRTIO_BLK_S_PENDING: u8 = 0xFF;

// 特性位（低32位）
pub const VIRTIO_BLK_F_RO: u32 = 1 << 5; // 只读设备
pub const VIRTIO_BLK_F_SCSI: u32 = 1 << 7; // SCSI 透传
pub const VIRTIO_BLK_F_CONFIG_WCE: u32 = 1 << 11; // 可配置写回缓存
pub const VIRTIO_BLK_F_MQ: u32 = 1 << 12; // 多队列
pub const VIRTIO_F_ANY_LAYOUT: u32 = 1 << 27;
pub const VIRTIO_F_RING_INDIRECT_DESC: u32 = 1 << 28;
pub const VIRTIO_F_RING_EVENT_IDX: u32 = 1 << 29;

// 特性位（高32位，bit 32 开始）
pub const VIRTIO_F_VERSION_1: u32 = 1 << 0; // bit 32

/// 协商时从设备特性低32位中去掉的位
pub const UNSUPPORTED_FEATURES_LOW: u32 = VIRTIO_BLK_F_RO
    | VIRTIO_BLK_F_SCSI
    | VIRTIO_BLK_F_CONFIG_WCE
    | VIRTIO_BLK_F_MQ
    | VIRTIO_F_ANY_LAYOUT
    | VIRTIO_F_RING_INDIRECT_DESC
    | VIRTIO_F_RING_EVENT_IDX;

/// 高32位只保留 VERSION_1
pub const SUPPORTED_FEATURES_HIGH: u32 = VIRTIO_F_VERSION_1;

/// 配置空间中 capacity 字段（以扇区计）的偏移
pub const VIRTIO_BLK_CONFIG_CAPACITY_LOW: usize = crate::virtio::VIRTIO_CONFIG;
pub const VIRTIO_BLK_CONFIG_CAPACITY_HIGH: usize = crate::virtio::VIRTIO_CONFIG + 4;
