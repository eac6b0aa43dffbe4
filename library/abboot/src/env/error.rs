// library/abboot/src/env/error.rs

/// 环境变量编解码错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvError {
    /// 存储的 CRC 与计算结果不一致
    ChecksumMismatch { stored: u32, computed: u32 },
    NotFound,
    /// 序列化结果超出环境区大小
    Overflow,
    BufferTooSmall { needed: usize, actual: usize },
    OutOfMemory,
    InvalidName,
    InvalidValue,
}

impl core::fmt::Display for EnvError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EnvError::ChecksumMismatch { stored, computed } => write!(
                f,
                "Environment checksum mismatch (stored 0x{:08x}, computed 0x{:08x})",
                stored, computed
            ),
            EnvError::NotFound => write!(f, "Variable not found"),
            EnvError::Overflow => write!(f, "Environment does not fit"),
            EnvError::BufferTooSmall { needed, actual } => {
                write!(f, "Buffer too small ({} < {} bytes)", actual, needed)
            }
            EnvError::OutOfMemory => write!(f, "Out of memory"),
            EnvError::InvalidName => write!(f, "Invalid variable name"),
            EnvError::InvalidValue => write!(f, "Invalid variable value"),
        }
    }
}

impl core::error::Error for EnvError {}
