// library/abboot/src/env/arena.rs
//! 单向增长的 bump 分配区
//!
//! 一次引导只走一遍流程，最后以不返回的跳转结束，所以这里从不回收，也没有
//! reset。每次分配交出一段互不重叠的 `&'a mut [u8]`。

use super::EnvError;

/// 分配对齐（字节）
pub const ARENA_ALIGN: usize = 8;

pub struct Arena<'a> {
    free: &'a mut [u8],
    used: usize,
}

impl<'a> Arena<'a> {
    pub fn new(region: &'a mut [u8]) -> Self {
        Self { free: region, used: 0 }
    }

    /// 用一段裸内存创建分配区
    ///
    /// # Safety
    ///
    /// `[start, start + len)` 必须是可读写的内存，在 `'a` 内没有其它引用。
    pub unsafe fn from_raw(start: *mut u8, len: usize) -> Self {
        // SAFETY: 由调用者保证
        Self::new(unsafe { core::slice::from_raw_parts_mut(start, len) })
    }

    /// 分配 `len` 字节，清零且 8 字节对齐
    pub fn alloc(&mut self, len: usize) -> Result<&'a mut [u8], EnvError> {
        let addr = self.free.as_ptr() as usize;
        let pad = addr.next_multiple_of(ARENA_ALIGN) - addr;
        if pad.checked_add(len).is_none_or(|total| total > self.free.len()) {
            return Err(EnvError::OutOfMemory);
        }

        let free = core::mem::take(&mut self.free);
        let (_, rest) = free.split_at_mut(pad);
        let (block, rest) = rest.split_at_mut(len);
        self.free = rest;
        self.used += pad + len;

        block.fill(0);
        Ok(block)
    }

    /// 分配 `len` 个 `T`，每个都初始化为 `fill`
    ///
    /// `T` 的对齐不能超过 [`ARENA_ALIGN`]。
    pub fn alloc_slice<T: Copy>(&mut self, len: usize, fill: T) -> Result<&'a mut [T], EnvError> {
        if core::mem::align_of::<T>() > ARENA_ALIGN {
            return Err(EnvError::OutOfMemory);
        }
        let bytes = len.checked_mul(core::mem::size_of::<T>()).ok_or(EnvError::OutOfMemory)?;
        let block = self.alloc(bytes)?;
        let ptr = block.as_mut_ptr().cast::<T>();
        // SAFETY: block 8 字节对齐、长度足够放下 len 个 T，并且在 'a 内独占；
        // T: Copy，覆盖写入不需要 drop
        unsafe {
            for i in 0..len {
                ptr.add(i).write(fill);
            }
            Ok(core::slice::from_raw_parts_mut(ptr, len))
        }
    }

    /// 把字符串复制进分配区
    pub fn alloc_str(&mut self, s: &str) -> Result<&'a str, EnvError> {
        let block = self.alloc(s.len())?;
        block.copy_from_slice(s.as_bytes());
        core::str::from_utf8(block).map_err(|_| EnvError::InvalidValue)
    }

    /// 已用字节数（含对齐填充）
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(align(8))]
    struct Backing([u8; 64]);

    #[test]
    fn test_allocations_are_aligned_and_disjoint() {
        let mut backing = Backing([0xEE; 64]);
        let mut arena = Arena::new(&mut backing.0);

        let a = arena.alloc(3).unwrap();
        let b = arena.alloc(5).unwrap();
        assert_eq!(a.as_ptr() as usize % ARENA_ALIGN, 0);
        assert_eq!(b.as_ptr() as usize % ARENA_ALIGN, 0);
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 8);
        assert!(a.iter().chain(b.iter()).all(|&byte| byte == 0));

        a[0] = 1;
        b[0] = 2;
        assert_eq!((a[0], b[0]), (1, 2));
        assert_eq!(arena.used(), 13);
        assert_eq!(arena.remaining(), 64 - 13);
    }

    #[test]
    fn test_exhaustion() {
        let mut backing = Backing([0; 64]);
        let mut arena = Arena::new(&mut backing.0);
        assert!(arena.alloc(60).is_ok());
        assert_eq!(arena.alloc(8), Err(EnvError::OutOfMemory));
        // 失败的分配不改变状态
        assert_eq!(arena.used(), 60);
        assert!(arena.alloc(0).is_ok());
    }

    #[test]
    fn test_alloc_slice() {
        let mut backing = Backing([0xEE; 64]);
        let mut arena = Arena::new(&mut backing.0);
        arena.alloc(1).unwrap();

        let words = arena.alloc_slice(3, 7u64).unwrap();
        assert_eq!(words.as_ptr() as usize % ARENA_ALIGN, 0);
        assert_eq!(&words[..], &[7, 7, 7]);
        words[1] = 9;
        assert_eq!(arena.used(), 8 + 24);

        assert_eq!(arena.alloc_slice(5, 0u64), Err(EnvError::OutOfMemory));
        assert_eq!(arena.alloc_slice(usize::MAX, 0u64), Err(EnvError::OutOfMemory));
        assert_eq!(arena.used(), 32);
    }

    #[test]
    fn test_alloc_str() {
        let mut backing = Backing([0; 64]);
        let mut arena = Arena::new(&mut backing.0);
        let s = arena.alloc_str("bootcount").unwrap();
        assert_eq!(s, "bootcount");
    }
}
