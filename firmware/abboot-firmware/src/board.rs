// firmware/abboot-firmware/src/board.rs
//! 编译期嵌入的板级配置（board.toml）

use abboot::{BootConfig, EnvNames, Slot};
use log::LevelFilter;

use crate::console::UartConfig;

static_toml::static_toml! {
    static BOARD = include_toml!("board.toml");
}

pub fn boot_config() -> BootConfig {
    let defaults = BootConfig::default();
    BootConfig {
        virtio_base: BOARD.virtio.base as usize,
        env_lba: BOARD.env.lba as u64,
        env_size: BOARD.env.size as usize,
        default_kernel_lba: BOARD.kernel.default_lba as u64,
        kernel_load_addr: BOARD.kernel.load_addr as usize,
        kernel_max_size: BOARD.kernel.max_size as usize,
        dtb_max_size: BOARD.kernel.dtb_max_size as usize,
        default_slot: Slot::parse(BOARD.env.default_slot).unwrap_or(defaults.default_slot),
        names: EnvNames::default(),
    }
}

pub fn uart() -> UartConfig {
    UartConfig {
        base: BOARD.uart.base as usize,
        clock: BOARD.uart.clock as u32,
        baud: BOARD.uart.baud as u32,
    }
}

pub fn log_level() -> LevelFilter {
    BOARD.log.level.parse().unwrap_or(LevelFilter::Info)
}
