// library/abboot/src/failback.rs
//! A/B 槽位选择和自动回退
//!
//! | upgrade_available | bootcount | 动作 |
//! |---|---|---|
//! | "0"/缺失 | 任意 | 无 |
//! | "1" | "1" | 回退：切换槽位，upgrade_available="0"，bootcount="0" |
//! | "1" | 其它/缺失 | 首次尝试：bootcount="1" |

use core::fmt;
use core::fmt::Write;

use heapless::String;
use log::{info, warn};

use crate::config::{BootConfig, EnvNames};
use crate::env::{EnvError, UbootEnv};

/// 固件槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "a" => Some(Slot::A),
            "b" => Some(Slot::B),
            _ => None,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::A => "a",
            Slot::B => "b",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 本次引导对环境做的修改
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailbackAction {
    None,
    /// 新槽位第一次启动
    FirstTry,
    /// 新槽位上次没有确认，切回另一个槽位
    Revert,
}

impl FailbackAction {
    /// 是否需要写回环境区
    pub fn needs_commit(self) -> bool {
        self != FailbackAction::None
    }
}

/// 只看两个计数变量决定动作
pub fn decide(upgrade_available: Option<&str>, bootcount: Option<&str>) -> FailbackAction {
    match (upgrade_available, bootcount) {
        (Some("1"), Some("1")) => FailbackAction::Revert,
        (Some("1"), _) => FailbackAction::FirstTry,
        _ => FailbackAction::None,
    }
}

/// 槽位选择结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootSelection<'a> {
    pub slot: Slot,
    pub kernel_lba: u64,
    pub kernel_args: Option<&'a str>,
    pub action: FailbackAction,
}

/// `<slot><suffix>`
fn slot_key(slot: Slot, suffix: &str) -> Result<String<32>, EnvError> {
    let mut key = String::new();
    write!(key, "{}{}", slot, suffix).map_err(|_| EnvError::InvalidName)?;
    Ok(key)
}

/// 读出当前槽位
fn active_slot(env: &UbootEnv<'_, '_>, names: &EnvNames, default: Slot) -> Slot {
    match env.get(names.active) {
        Ok(value) => Slot::parse(value).unwrap_or_else(|| {
            warn!("Invalid `{}` value '{}', using slot {}", names.active, value, default);
            default
        }),
        Err(_) => {
            warn!("Failed to get `{}` from U-Boot environment, using slot {}", names.active, default);
            default
        }
    }
}

/// 应用回退策略（可能修改 `env`），然后读出所选槽位的内核位置和参数
///
/// 只有环境变量表本身出错（分配区耗尽、表满）才返回错误。
pub fn apply<'a>(
    env: &mut UbootEnv<'a, '_>,
    config: &BootConfig,
) -> Result<BootSelection<'a>, EnvError> {
    let names = &config.names;
    let mut slot = active_slot(env, names, config.default_slot);

    let action = decide(env.get(names.upgrade_available).ok(), env.get(names.bootcount).ok());
    match action {
        FailbackAction::Revert => {
            info!("Slot {} didn't validate, so reverting back...", slot);
            slot = slot.other();
            env.set(names.active, slot.as_str())?;
            env.set(names.upgrade_available, "0")?;
            env.set(names.bootcount, "0")?;
        }
        FailbackAction::FirstTry => {
            info!("Trying slot {} for the first time...", slot);
            env.set(names.bootcount, "1")?;
        }
        FailbackAction::None => {}
    }

    let lba_key = slot_key(slot, names.kernel_lba_suffix)?;
    let kernel_lba = match env.get(&lba_key) {
        Ok(value) => value.trim().parse::<u64>().unwrap_or_else(|_| {
            warn!("Invalid '{}' value '{}', using default", lba_key, value);
            config.default_kernel_lba
        }),
        Err(_) => {
            warn!("No '{}' variable found in u-boot environment, using default.", lba_key);
            config.default_kernel_lba
        }
    };

    let args_key = slot_key(slot, names.kernel_args_suffix)?;
    let kernel_args = env.get(&args_key).ok();

    Ok(BootSelection { slot, kernel_lba, kernel_args, action })
}
