// library/abboot/src/config.rs
//! 板级常量

use crate::failback::Slot;

/// 环境变量名
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvNames {
    /// 当前活动槽位（"a"/"b"）
    pub active: &'static str,
    pub upgrade_available: &'static str,
    pub bootcount: &'static str,
    /// 槽位相关变量的后缀，完整名字是 `<slot><suffix>`
    pub kernel_lba_suffix: &'static str,
    pub kernel_args_suffix: &'static str,
}

impl Default for EnvNames {
    fn default() -> Self {
        Self {
            active: "nerves_fw_active",
            upgrade_available: "upgrade_available",
            bootcount: "bootcount",
            kernel_lba_suffix: ".kernel_lba",
            kernel_args_suffix: ".kernel_args",
        }
    }
}

/// 引导流程需要的所有常量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    /// virtio-mmio 块设备寄存器基址
    pub virtio_base: usize,
    pub env_lba: u64,
    /// 环境区字节数，必须是扇区大小的整数倍
    pub env_size: usize,
    pub default_kernel_lba: u64,
    pub kernel_load_addr: usize,
    pub kernel_max_size: usize,
    /// 内核之后留给设备树的空间
    pub dtb_max_size: usize,
    pub default_slot: Slot,
    pub names: EnvNames,
}

impl BootConfig {
    /// QEMU virt 机器
    pub const QEMU_VIRT_VIRTIO_BASE: usize = 0x0a00_0000;
    pub const ENV_LBA: u64 = 16;
    pub const ENV_SIZE: usize = 256 * 512;
    pub const DEFAULT_KERNEL_LBA: u64 = 512;
    pub const KERNEL_LOAD_ADDR: usize = 0x4020_0000;
    pub const KERNEL_MAX_SIZE: usize = 64 * 1024 * 1024;
    pub const DTB_MAX_SIZE: usize = 2 * 1024 * 1024;

    /// 内核加上设备树需要的整个装载区大小
    pub fn load_region_size(&self) -> usize {
        self.kernel_max_size.next_multiple_of(8) + self.dtb_max_size
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            virtio_base: Self::QEMU_VIRT_VIRTIO_BASE,
            env_lba: Self::ENV_LBA,
            env_size: Self::ENV_SIZE,
            default_kernel_lba: Self::DEFAULT_KERNEL_LBA,
            kernel_load_addr: Self::KERNEL_LOAD_ADDR,
            kernel_max_size: Self::KERNEL_MAX_SIZE,
            dtb_max_size: Self::DTB_MAX_SIZE,
            default_slot: Slot::A,
            names: EnvNames::default(),
        }
    }
}
