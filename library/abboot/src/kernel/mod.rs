//! 内核和设备树装载
// library/abboot/src/kernel/mod.rs

pub mod dtb;
pub mod error;
pub mod header;
pub mod loader;

pub use dtb::{relocate_and_patch, DeviceTree, FDT_MAGIC};
pub use error::{DtbError, LoadError};
pub use header::{KernelHeader, ARM64_IMAGE_MAGIC};
pub use loader::{load_kernel, KernelImage};
