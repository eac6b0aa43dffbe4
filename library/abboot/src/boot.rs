// library/abboot/src/boot.rs
//! 引导编排
//!
//! 顺序：检查异常级别 → virtio 初始化 → 读环境区 → 槽位回退（必要时写回）
//! → 装载内核 → 搬移并修改设备树 → 跳转。
//! 哪些错误可以用默认值继续、哪些必须关机，全部在这里决定。

use core::fmt;

use log::{debug, error, info, warn};

use crate::config::BootConfig;
use crate::env::{Arena, UbootEnv};
use crate::error::FatalError;
use crate::failback::{self, BootSelection, FailbackAction};
use crate::kernel::{load_kernel, relocate_and_patch, DeviceTree, DtbError};
use crate::platform::Platform;
use crate::virtio::{RegisterAccess, VirtioBlk};
use crate::{PROGRAM_NAME, PROGRAM_VERSION};

/// 跳转前需要的全部信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handoff {
    pub entry: usize,
    pub dtb: usize,
    pub dtb_size: usize,
    pub kernel_size: usize,
}

/// 检查异常级别：EL1/EL2 正常，EL3 只警告，其它无法继续
pub fn check_el<P: Platform>(platform: &P) -> Result<u8, FatalError> {
    let el = platform.current_el();
    match el {
        1 | 2 => Ok(el),
        3 => {
            warn!("Running at EL3, expected EL2 (-M virt,virtualization=on)");
            Ok(el)
        }
        _ => Err(FatalError::UnsupportedEl(el)),
    }
}

/// 没有可用环境时的选择
fn default_selection<'a>(config: &BootConfig) -> BootSelection<'a> {
    BootSelection {
        slot: config.default_slot,
        kernel_lba: config.default_kernel_lba,
        kernel_args: None,
        action: FailbackAction::None,
    }
}

/// 读环境区、执行槽位回退并在需要时写回
///
/// 只有读环境区时的传输错误是致命的；校验失败、变量缺失、写回失败都退回默认值
/// 或者只打警告。
pub fn select_boot<'a, R: RegisterAccess>(
    config: &BootConfig,
    blk: &mut VirtioBlk<'_, R>,
    arena: &mut Arena<'a>,
) -> Result<BootSelection<'a>, FatalError> {
    let blob = arena.alloc(config.env_size).map_err(FatalError::EnvBuffer)?;
    blk.read(config.env_lba, blob).map_err(FatalError::EnvRead)?;

    let mut env = match UbootEnv::read(arena, config.env_size, blob) {
        Ok(env) => env,
        Err(e) => {
            warn!("{}, using defaults", e);
            return Ok(default_selection(config));
        }
    };
    for var in env.iter() {
        debug!("env: {}={}", var.name, var.value);
    }

    let selection = match failback::apply(&mut env, config) {
        Ok(selection) => selection,
        Err(e) => {
            warn!("Automatic failback check skipped: {}", e);
            return Ok(default_selection(config));
        }
    };

    if selection.action.needs_commit() {
        match env.write(blob) {
            Ok(_) => {
                if let Err(e) = blk.write(config.env_lba, blob) {
                    warn!("Failed to save U-Boot environment: {}", e);
                }
            }
            Err(e) => warn!("Failed to encode U-Boot environment: {}", e),
        }
    }

    info!("Booting from slot {} with kernel LBA {}", selection.slot, selection.kernel_lba);
    Ok(selection)
}

/// 装载内核，把设备树搬到内核后面（8 字节对齐）并写入 bootargs
///
/// `load_region` 的起始地址就是内核入口。
pub fn load<R: RegisterAccess>(
    config: &BootConfig,
    blk: &mut VirtioBlk<'_, R>,
    selection: &BootSelection<'_>,
    dtb: &DeviceTree<'_>,
    load_region: &mut [u8],
) -> Result<Handoff, FatalError> {
    if selection.kernel_args.is_none() {
        if let Ok(Some(args)) = dtb.chosen_property("bootargs") {
            let args = args.strip_suffix(&[0]).unwrap_or(args);
            let args = core::str::from_utf8(args).unwrap_or("<non-UTF-8>");
            info!("Keeping bootargs from device tree: {}", args);
        }
    }

    let entry = load_region.as_ptr() as usize;
    let image = load_kernel(blk, selection.kernel_lba, load_region, config.kernel_max_size)?;

    let dtb_offset = image.size.next_multiple_of(8);
    let available = load_region.len().saturating_sub(dtb_offset);
    let dest = load_region
        .get_mut(dtb_offset..)
        .ok_or(DtbError::NoSpace { needed: dtb.total_size(), available })?;
    let dtb_size = relocate_and_patch(dtb, dest, selection.kernel_args)?;

    Ok(Handoff { entry, dtb: entry + dtb_offset, dtb_size, kernel_size: image.size })
}

/// 从异常级别检查一直走到可以跳转的状态
///
/// # Safety
///
/// `dtb_source` 必须指向可读内存（magic 校验通过后，头部声明的整个 blob 都
/// 必须可读），且不能和 `load_region` 重叠。
pub unsafe fn prepare<P: Platform, R: RegisterAccess>(
    platform: &P,
    config: &BootConfig,
    blk: &mut VirtioBlk<'_, R>,
    arena: &mut Arena<'_>,
    load_region: &mut [u8],
    dtb_source: *const u8,
) -> Result<Handoff, FatalError> {
    check_el(platform)?;
    blk.init()?;

    let selection = select_boot(config, blk, arena)?;
    // SAFETY: 由调用者保证
    let dtb = unsafe { DeviceTree::from_ptr(dtb_source) }?;
    load(config, blk, &selection, &dtb, load_region)
}

/// 跳转到内核，不会返回
pub fn handoff<P: Platform>(platform: &mut P, handoff: &Handoff) -> ! {
    if platform.current_el() == 2 {
        platform.enable_timer_access();
    }
    info!("Starting Linux... (entry 0x{:x}, dtb 0x{:x})", handoff.entry, handoff.dtb);
    // SAFETY: entry 处是刚校验过头部的内核，dtb 是刚写好的设备树
    unsafe { platform.jump_to_kernel(handoff.entry, handoff.dtb) }
}

/// 记录原因后关机
pub fn terminate<P: Platform>(platform: &mut P, reason: impl fmt::Display) -> ! {
    error!("FATAL ERROR: {}", reason);
    error!("POWERING OFF.");
    platform.power_off()
}

/// 完整的引导流程
///
/// # Safety
///
/// 同 [`prepare`]。
pub unsafe fn run<P: Platform, R: RegisterAccess>(
    platform: &mut P,
    config: &BootConfig,
    blk: &mut VirtioBlk<'_, R>,
    arena: &mut Arena<'_>,
    load_region: &mut [u8],
    dtb_source: *const u8,
) -> ! {
    info!("{} {}", PROGRAM_NAME, PROGRAM_VERSION);
    // SAFETY: 由调用者保证
    match unsafe { prepare(platform, config, blk, arena, load_region, dtb_source) } {
        Ok(h) => handoff(platform, &h),
        Err(e) => terminate(platform, e),
    }
}
