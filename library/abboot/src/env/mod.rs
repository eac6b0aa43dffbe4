//! 磁盘上的 U-Boot 环境变量
// library/abboot/src/env/mod.rs

pub mod arena;
pub mod codec;
pub mod error;

pub use arena::Arena;
pub use codec::{UbootEnv, Variable, ENV_HEADER_SIZE};
pub use error::EnvError;
