// library/abboot/src/kernel/dtb.rs
//! 扁平设备树（FDT）的搬移和 /chosen/bootargs 修改
//!
//! 只做原地编辑：需要插入内容时把后面的块整体后移，并更新头部的偏移和大小。
//! 所有多字节字段都是大端。

use log::{debug, info};

use super::DtbError;

pub const FDT_MAGIC: u32 = 0xd00d_feed;
/// 需要头部里的 size_dt_struct 字段
pub const FDT_MIN_VERSION: u32 = 17;
pub const FDT_HEADER_SIZE: usize = 40;

const FDT_BEGIN_NODE: u32 = 0x1;
const FDT_END_NODE: u32 = 0x2;
const FDT_PROP: u32 = 0x3;
const FDT_NOP: u32 = 0x4;
const FDT_END: u32 = 0x9;

// 头部字段偏移
const HDR_TOTALSIZE: usize = 4;
const HDR_OFF_DT_STRUCT: usize = 8;
const HDR_OFF_DT_STRINGS: usize = 12;
const HDR_OFF_MEM_RSVMAP: usize = 16;
const HDR_VERSION: usize = 20;
const HDR_SIZE_DT_STRINGS: usize = 32;
const HDR_SIZE_DT_STRUCT: usize = 36;

const CHOSEN: &[u8] = b"chosen";
const BOOTARGS: &str = "bootargs";

fn be32(blob: &[u8], off: usize) -> Result<u32, DtbError> {
    let bytes = blob.get(off..off + 4).ok_or(DtbError::Truncated)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn put_be32(blob: &mut [u8], off: usize, value: u32) {
    blob[off..off + 4].copy_from_slice(&value.to_be_bytes());
}

const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

#[derive(Debug, Clone, Copy)]
struct Header {
    totalsize: usize,
    off_struct: usize,
    off_strings: usize,
    size_strings: usize,
    size_struct: usize,
}

impl Header {
    fn read(blob: &[u8]) -> Result<Self, DtbError> {
        let magic = be32(blob, 0)?;
        if magic != FDT_MAGIC {
            return Err(DtbError::BadMagic(magic));
        }
        let version = be32(blob, HDR_VERSION)?;
        if version < FDT_MIN_VERSION {
            return Err(DtbError::UnsupportedVersion(version));
        }
        let header = Self {
            totalsize: be32(blob, HDR_TOTALSIZE)? as usize,
            off_struct: be32(blob, HDR_OFF_DT_STRUCT)? as usize,
            off_strings: be32(blob, HDR_OFF_DT_STRINGS)? as usize,
            size_strings: be32(blob, HDR_SIZE_DT_STRINGS)? as usize,
            size_struct: be32(blob, HDR_SIZE_DT_STRUCT)? as usize,
        };
        if header.totalsize < FDT_HEADER_SIZE
            || header.off_struct + header.size_struct > header.totalsize
            || header.off_strings + header.size_strings > header.totalsize
        {
            return Err(DtbError::Malformed);
        }
        Ok(header)
    }

    fn struct_end(&self) -> usize {
        self.off_struct + self.size_struct
    }
}

/// 结构块里的一个 token
#[derive(Debug, Clone, Copy)]
enum Token<'b> {
    BeginNode(&'b [u8]),
    EndNode,
    Prop { nameoff: usize, len: usize },
    Nop,
    End,
}

/// 解析 `pos` 处的 token，返回 token 和下一个 token 的位置
fn token_at<'b>(blob: &'b [u8], hdr: &Header, pos: usize) -> Result<(Token<'b>, usize), DtbError> {
    let end = hdr.struct_end();
    if pos + 4 > end {
        return Err(DtbError::Malformed);
    }
    let body = pos + 4;
    let (token, next) = match be32(blob, pos)? {
        FDT_BEGIN_NODE => {
            let rest = blob.get(body..end).ok_or(DtbError::Truncated)?;
            let name_len = rest.iter().position(|&b| b == 0).ok_or(DtbError::Malformed)?;
            (Token::BeginNode(&rest[..name_len]), align4(body + name_len + 1))
        }
        FDT_END_NODE => (Token::EndNode, body),
        FDT_PROP => {
            let len = be32(blob, body)? as usize;
            let nameoff = be32(blob, body + 4)? as usize;
            (Token::Prop { nameoff, len }, align4(body + 8 + len))
        }
        FDT_NOP => (Token::Nop, body),
        FDT_END => (Token::End, body),
        _ => return Err(DtbError::Malformed),
    };
    if next > end {
        return Err(DtbError::Malformed);
    }
    Ok((token, next))
}

/// 字符串块里 `nameoff` 处的名字（不含 NUL）
fn string_at<'b>(blob: &'b [u8], hdr: &Header, nameoff: usize) -> Result<&'b [u8], DtbError> {
    let strings = blob
        .get(hdr.off_strings..hdr.off_strings + hdr.size_strings)
        .ok_or(DtbError::Truncated)?;
    let rest = strings.get(nameoff..).ok_or(DtbError::Malformed)?;
    let len = rest.iter().position(|&b| b == 0).ok_or(DtbError::Malformed)?;
    Ok(&rest[..len])
}

/// 在字符串块里找完整的 `name\0`
fn find_string(blob: &[u8], hdr: &Header, name: &str) -> Option<usize> {
    let strings = blob.get(hdr.off_strings..hdr.off_strings + hdr.size_strings)?;
    let mut off = 0;
    for s in strings.split(|&b| b == 0) {
        if s == name.as_bytes() && off + s.len() < strings.len() {
            return Some(off);
        }
        off += s.len() + 1;
    }
    None
}

/// 根节点和 /chosen 在结构块里的位置
struct ChosenLocation {
    /// /chosen 的第一个子 token
    body: Option<usize>,
    /// 根节点的 END_NODE
    root_end: usize,
}

fn locate_chosen(blob: &[u8], hdr: &Header) -> Result<ChosenLocation, DtbError> {
    let mut pos = hdr.off_struct;
    let mut depth = 0usize;
    let mut body = None;
    loop {
        let (token, next) = token_at(blob, hdr, pos)?;
        match token {
            Token::BeginNode(name) => {
                if depth == 1 && name == CHOSEN && body.is_none() {
                    body = Some(next);
                }
                depth += 1;
            }
            Token::EndNode => {
                depth = depth.checked_sub(1).ok_or(DtbError::Malformed)?;
                if depth == 0 {
                    return Ok(ChosenLocation { body, root_end: pos });
                }
            }
            Token::Prop { .. } | Token::Nop => {}
            Token::End => return Err(DtbError::Malformed),
        }
        pos = next;
    }
}

/// 节点内的属性查找结果
enum PropSlot {
    /// PROP token 的位置和值长度
    Found { pos: usize, len: usize },
    /// 新属性应插入的位置（第一个子节点或 END_NODE 之前）
    Missing { insert_at: usize },
}

fn find_prop(blob: &[u8], hdr: &Header, body: usize, name: &str) -> Result<PropSlot, DtbError> {
    let mut pos = body;
    let mut depth = 0usize;
    let mut insert_at = None;
    loop {
        let (token, next) = token_at(blob, hdr, pos)?;
        match token {
            Token::Prop { nameoff, len } if depth == 0 => {
                if string_at(blob, hdr, nameoff)? == name.as_bytes() {
                    return Ok(PropSlot::Found { pos, len });
                }
            }
            Token::BeginNode(_) => {
                if depth == 0 && insert_at.is_none() {
                    insert_at = Some(pos);
                }
                depth += 1;
            }
            Token::EndNode => {
                if depth == 0 {
                    return Ok(PropSlot::Missing { insert_at: insert_at.unwrap_or(pos) });
                }
                depth -= 1;
            }
            Token::End => return Err(DtbError::Malformed),
            Token::Prop { .. } | Token::Nop => {}
        }
        pos = next;
    }
}

/// 校验过头部的只读设备树
#[derive(Debug, Clone, Copy)]
pub struct DeviceTree<'a> {
    blob: &'a [u8],
}

impl<'a> DeviceTree<'a> {
    /// `bytes` 可以比 totalsize 长，多出的部分被忽略
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, DtbError> {
        let header = Header::read(bytes)?;
        let blob = bytes.get(..header.totalsize).ok_or(DtbError::Truncated)?;
        Ok(Self { blob })
    }

    /// 从固件传进来的物理地址创建
    ///
    /// # Safety
    ///
    /// `ptr` 必须可读；magic 校验通过后，头部声明的 totalsize 字节在 `'a`
    /// 内都必须可读且不被修改。
    pub unsafe fn from_ptr(ptr: *const u8) -> Result<Self, DtbError> {
        // SAFETY: 先只读 magic 和 totalsize 两个字
        let head = unsafe { core::slice::from_raw_parts(ptr, 8) };
        let magic = be32(head, 0)?;
        if magic != FDT_MAGIC {
            return Err(DtbError::BadMagic(magic));
        }
        let totalsize = be32(head, HDR_TOTALSIZE)? as usize;
        if totalsize < FDT_HEADER_SIZE {
            return Err(DtbError::Truncated);
        }
        // SAFETY: 由调用者保证
        Self::from_bytes(unsafe { core::slice::from_raw_parts(ptr, totalsize) })
    }

    pub fn total_size(&self) -> usize {
        self.blob.len()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.blob
    }

    /// /chosen 下某个属性的原始值
    pub fn chosen_property(&self, name: &str) -> Result<Option<&'a [u8]>, DtbError> {
        let hdr = Header::read(self.blob)?;
        let Some(body) = locate_chosen(self.blob, &hdr)?.body else {
            return Ok(None);
        };
        match find_prop(self.blob, &hdr, body, name)? {
            PropSlot::Found { pos, len } => Ok(self.blob.get(pos + 12..pos + 12 + len)),
            PropSlot::Missing { .. } => Ok(None),
        }
    }
}

/// 在 `buf` 里原地编辑设备树，`buf` 的剩余部分是可增长空间
struct FdtEditor<'b> {
    buf: &'b mut [u8],
}

impl<'b> FdtEditor<'b> {
    fn header(&self) -> Result<Header, DtbError> {
        Header::read(self.buf)
    }

    fn field(&self, off: usize) -> Result<usize, DtbError> {
        be32(self.buf, off).map(|v| v as usize)
    }

    fn set_field(&mut self, off: usize, value: usize) {
        put_be32(self.buf, off, value as u32);
    }

    /// 把 `[offset, offset + old_len)` 替换成 `new_len` 字节的零，后面的内容跟着移动
    fn splice(&mut self, offset: usize, old_len: usize, new_len: usize) -> Result<(), DtbError> {
        let total = self.field(HDR_TOTALSIZE)?;
        let tail = offset + old_len;
        if tail > total {
            return Err(DtbError::Malformed);
        }
        let new_total = total - old_len + new_len;
        if new_total > self.buf.len() {
            return Err(DtbError::NoSpace { needed: new_total, available: self.buf.len() });
        }

        self.buf.copy_within(tail..total, offset + new_len);
        self.buf[offset..offset + new_len].fill(0);
        if new_total < total {
            self.buf[new_total..total].fill(0);
        }

        // 起点在被替换区间之后（包括恰好在插入点）的块整体移动
        for field in [HDR_OFF_DT_STRUCT, HDR_OFF_DT_STRINGS, HDR_OFF_MEM_RSVMAP] {
            let off = self.field(field)?;
            if off >= tail {
                self.set_field(field, off - old_len + new_len);
            }
        }
        self.set_field(HDR_TOTALSIZE, new_total);
        Ok(())
    }

    /// 在结构块里插入/替换，同时维护 size_dt_struct
    fn splice_struct(&mut self, offset: usize, old_len: usize, new_len: usize) -> Result<(), DtbError> {
        self.splice(offset, old_len, new_len)?;
        let size = self.field(HDR_SIZE_DT_STRUCT)?;
        self.set_field(HDR_SIZE_DT_STRUCT, size - old_len + new_len);
        Ok(())
    }

    /// 返回 `name` 在字符串块里的偏移，没有就追加
    fn ensure_string(&mut self, name: &str) -> Result<usize, DtbError> {
        let hdr = self.header()?;
        if let Some(off) = find_string(self.buf, &hdr, name) {
            return Ok(off);
        }
        let at = hdr.off_strings + hdr.size_strings;
        let len = name.len() + 1;
        // 字符串块在结构块前面时会把结构块往后推
        self.splice(at, 0, len)?;
        self.buf[at..at + name.len()].copy_from_slice(name.as_bytes());
        self.set_field(HDR_SIZE_DT_STRINGS, hdr.size_strings + len);
        Ok(hdr.size_strings)
    }

    /// 返回 /chosen 第一个子 token 的位置，没有就在根节点末尾创建
    fn ensure_chosen(&mut self) -> Result<usize, DtbError> {
        let hdr = self.header()?;
        let location = locate_chosen(self.buf, &hdr)?;
        if let Some(body) = location.body {
            return Ok(body);
        }

        // BEGIN_NODE "chosen\0" (+ 填充) END_NODE
        let name_len = align4(CHOSEN.len() + 1);
        let node_len = 4 + name_len + 4;
        let at = location.root_end;
        self.splice_struct(at, 0, node_len)?;
        put_be32(self.buf, at, FDT_BEGIN_NODE);
        self.buf[at + 4..at + 4 + CHOSEN.len()].copy_from_slice(CHOSEN);
        put_be32(self.buf, at + 4 + name_len, FDT_END_NODE);
        debug!("dtb: created /chosen");
        Ok(at + 4 + name_len)
    }

    /// 设置 /chosen 下的字符串属性（带 NUL）
    fn set_chosen_string(&mut self, name: &str, value: &str) -> Result<(), DtbError> {
        let nameoff = self.ensure_string(name)?;
        let body = self.ensure_chosen()?;
        let hdr = self.header()?;

        let len = value.len() + 1;
        let (pos, old_len) = match find_prop(self.buf, &hdr, body, name)? {
            PropSlot::Found { pos, len } => (pos, 12 + align4(len)),
            PropSlot::Missing { insert_at } => (insert_at, 0),
        };
        self.splice_struct(pos, old_len, 12 + align4(len))?;

        put_be32(self.buf, pos, FDT_PROP);
        put_be32(self.buf, pos + 4, len as u32);
        put_be32(self.buf, pos + 8, nameoff as u32);
        self.buf[pos + 12..pos + 12 + value.len()].copy_from_slice(value.as_bytes());
        Ok(())
    }
}

/// 把设备树复制到 `dest`，有 bootargs 时写进 /chosen
///
/// 返回新设备树的 totalsize。`dest` 整个都可以被设备树使用。
pub fn relocate_and_patch(
    src: &DeviceTree<'_>,
    dest: &mut [u8],
    bootargs: Option<&str>,
) -> Result<usize, DtbError> {
    let size = src.total_size();
    if dest.len() < size {
        return Err(DtbError::NoSpace { needed: size, available: dest.len() });
    }
    dest[..size].copy_from_slice(src.as_bytes());
    debug!("dtb: relocated {} bytes to {:p}", size, dest.as_ptr());

    let Some(args) = bootargs else {
        return Ok(size);
    };
    if args.contains('\0') {
        return Err(DtbError::Malformed);
    }
    let mut editor = FdtEditor { buf: dest };
    editor.set_chosen_string(BOOTARGS, args)?;
    let new_size = editor.field(HDR_TOTALSIZE)?;
    info!("dtb: bootargs = \"{}\"", args);
    Ok(new_size)
}
