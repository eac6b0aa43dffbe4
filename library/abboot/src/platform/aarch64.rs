// library/abboot/src/platform/aarch64.rs
use core::arch::asm;

use aarch64_cpu::asm::wfe;
use aarch64_cpu::registers::{CurrentEL, Readable};

use super::{Platform, PSCI_SYSTEM_OFF};

unsafe extern "C" {
    /// src/platform/jump.S
    fn abboot_jump_to_kernel(entry: usize, dtb: usize) -> !;
}

/// QEMU virt 上的 aarch64 平台
pub struct VirtPlatform {
    _private: (),
}

impl VirtPlatform {
    /// # Safety
    ///
    /// 整个程序只能有一个实例。
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl Platform for VirtPlatform {
    fn current_el(&self) -> u8 {
        ((CurrentEL.get() >> 2) & 0x3) as u8
    }

    fn enable_timer_access(&mut self) {
        // EL0PCTEN | EL0VCTEN：EL0 可读 cntvct_el0/cntfrq_el0
        unsafe {
            asm!("msr cntkctl_el1, {}", "isb", in(reg) 0x3u64, options(nostack));
        }
    }

    fn power_off(&mut self) -> ! {
        unsafe {
            asm!("smc #0", inout("x0") PSCI_SYSTEM_OFF as u64 => _, options(nostack));
        }
        loop {
            wfe();
        }
    }

    unsafe fn jump_to_kernel(&mut self, entry: usize, dtb: usize) -> ! {
        // SAFETY: 由调用者保证
        unsafe { abboot_jump_to_kernel(entry, dtb) }
    }
}
