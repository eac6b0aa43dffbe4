// library/abboot/src/env/codec.rs
//! U-Boot 环境区格式
//!
//! ```text
//! [CRC32 LE][name=value\0]...[\0][0 填充到固定大小]
//! ```
//! CRC 覆盖从偏移 4 到环境区末尾的所有字节（包括填充）。

use log::{trace, warn};

use super::{Arena, EnvError};

/// CRC 字段长度
pub const ENV_HEADER_SIZE: usize = 4;
/// 变量表第一次分配的最小容量
const MIN_TABLE_CAPACITY: usize = 16;
/// 读取时为之后的 set 预留的空位
const TABLE_SPARE: usize = 8;

/// 一个环境变量，名字和值都在分配区里
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl Variable<'_> {
    const EMPTY: Self = Variable { name: "", value: "" };
}

/// 分配区里的变量数组
///
/// 放满后换一块至少两倍大的数组，旧数组留在分配区里不回收；
/// 容量只受分配区大小限制。
struct VarTable<'a> {
    slots: &'a mut [Variable<'a>],
    len: usize,
}

impl<'a> VarTable<'a> {
    fn new() -> Self {
        Self { slots: Default::default(), len: 0 }
    }

    fn as_slice(&self) -> &[Variable<'a>] {
        &self.slots[..self.len]
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.as_slice().iter().position(|v| v.name == name)
    }

    /// 保证还能再放 `additional` 个变量
    fn reserve(&mut self, arena: &mut Arena<'a>, additional: usize) -> Result<(), EnvError> {
        let needed = self.len.checked_add(additional).ok_or(EnvError::OutOfMemory)?;
        if needed <= self.slots.len() {
            return Ok(());
        }
        let capacity = needed.max(self.slots.len() * 2).max(MIN_TABLE_CAPACITY);
        let slots = arena.alloc_slice(capacity, Variable::EMPTY)?;
        slots[..self.len].copy_from_slice(self.as_slice());
        trace!("env: variable table grown to {}", capacity);
        self.slots = slots;
        Ok(())
    }

    fn push(&mut self, var: Variable<'a>) {
        self.slots[self.len] = var;
        self.len += 1;
    }

    fn remove(&mut self, index: usize) {
        self.slots.copy_within(index + 1..self.len, index);
        self.len -= 1;
    }
}

/// 内存中的环境变量表，保持插入顺序
pub struct UbootEnv<'a, 'h> {
    arena: &'h mut Arena<'a>,
    size: usize,
    vars: VarTable<'a>,
}

impl<'a, 'h> UbootEnv<'a, 'h> {
    /// 空环境，`size` 是磁盘上环境区的总字节数
    pub fn new(arena: &'h mut Arena<'a>, size: usize) -> Self {
        Self { arena, size, vars: VarTable::new() }
    }

    /// 校验并解析环境区
    ///
    /// 同名变量出现多次时，后出现的值生效，位置保持第一次出现的位置。
    pub fn read(arena: &'h mut Arena<'a>, size: usize, buf: &[u8]) -> Result<Self, EnvError> {
        if size <= ENV_HEADER_SIZE || buf.len() < size {
            return Err(EnvError::BufferTooSmall { needed: size, actual: buf.len() });
        }

        let stored = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let data = &buf[ENV_HEADER_SIZE..size];
        let computed = crc32fast::hash(data);
        if stored != computed {
            return Err(EnvError::ChecksumMismatch { stored, computed });
        }

        let entries = || data.split(|&b| b == 0).take_while(|entry| !entry.is_empty());
        let mut env = Self::new(arena, size);
        env.vars.reserve(env.arena, entries().count() + TABLE_SPARE)?;
        for entry in entries() {
            let Ok(text) = core::str::from_utf8(entry) else {
                warn!("env: skipping entry with invalid UTF-8");
                continue;
            };
            let Some((name, value)) = text.split_once('=') else {
                warn!("env: skipping entry without '=': {}", text);
                continue;
            };
            if name.is_empty() {
                warn!("env: skipping entry with empty name");
                continue;
            }
            env.set(name, value)?;
        }
        trace!("env: {} variables", env.len());
        Ok(env)
    }

    /// 查找变量
    pub fn get(&self, name: &str) -> Result<&'a str, EnvError> {
        self.iter()
            .find(|v| v.name == name)
            .map(|v| v.value)
            .ok_or(EnvError::NotFound)
    }

    /// 设置变量：已存在则原地替换，否则追加到末尾
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), EnvError> {
        if name.is_empty() || name.contains(['=', '\0']) {
            return Err(EnvError::InvalidName);
        }
        if value.contains('\0') {
            return Err(EnvError::InvalidValue);
        }

        if let Some(index) = self.vars.position(name) {
            self.vars.slots[index].value = self.arena.alloc_str(value)?;
            return Ok(());
        }
        self.vars.reserve(self.arena, 1)?;
        let name = self.arena.alloc_str(name)?;
        let value = self.arena.alloc_str(value)?;
        self.vars.push(Variable { name, value });
        Ok(())
    }

    /// 删除变量，不存在时什么都不做
    pub fn unset(&mut self, name: &str) {
        if let Some(index) = self.vars.position(name) {
            self.vars.remove(index);
        }
    }

    /// 序列化后实际占用的字节数（不含填充）
    pub fn encoded_len(&self) -> usize {
        ENV_HEADER_SIZE
            + self.iter().map(|v| v.name.len() + v.value.len() + 2).sum::<usize>()
            + 1
    }

    /// 序列化到 `buf` 的前 `size` 字节并重新计算 CRC
    ///
    /// 内容放不下时返回 `Overflow`，`buf` 不会被修改。
    pub fn write(&self, buf: &mut [u8]) -> Result<usize, EnvError> {
        if buf.len() < self.size {
            return Err(EnvError::BufferTooSmall { needed: self.size, actual: buf.len() });
        }
        if self.encoded_len() > self.size {
            return Err(EnvError::Overflow);
        }

        let out = &mut buf[..self.size];
        out.fill(0);
        let mut pos = ENV_HEADER_SIZE;
        for var in self.iter() {
            for part in [var.name.as_bytes(), b"=".as_slice(), var.value.as_bytes()] {
                out[pos..pos + part.len()].copy_from_slice(part);
                pos += part.len();
            }
            pos += 1; // NUL
        }

        let crc = crc32fast::hash(&out[ENV_HEADER_SIZE..]);
        out[..ENV_HEADER_SIZE].copy_from_slice(&crc.to_le_bytes());
        Ok(self.size)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable<'a>> {
        self.vars.as_slice().iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len
    }

    pub fn is_empty(&self) -> bool {
        self.vars.len == 0
    }
}
