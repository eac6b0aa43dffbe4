//! 特权指令边界
// library/abboot/src/platform/mod.rs
//
// 读异常级别、开放计时器、关机、跳转内核；只有这里允许使用目标相关的指令。

/// PSCI 0.2 SYSTEM_OFF 函数号（SMC32）
pub const PSCI_SYSTEM_OFF: u32 = 0x8400_0008;

pub trait Platform {
    /// 当前异常级别（0-3）
    fn current_el(&self) -> u8;

    /// 允许低异常级别访问虚拟计时器和计数器（CNTKCTL_EL1）
    fn enable_timer_access(&mut self);

    /// 请求关机；固件调用返回时原地等待
    fn power_off(&mut self) -> !;

    /// 按 arm64 引导约定跳转：x0 = 设备树，x1-x3 = 0
    ///
    /// # Safety
    ///
    /// `entry` 必须是已装载内核的入口，`dtb` 必须指向有效的设备树。
    unsafe fn jump_to_kernel(&mut self, entry: usize, dtb: usize) -> !;
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "aarch64", target_os = "none"))] {
        mod aarch64;
        pub use aarch64::VirtPlatform;
    }
}
