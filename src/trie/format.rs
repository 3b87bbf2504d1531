//! 前缀树文件的二进制布局
//!
//! ```text
//! header (24 bytes, little-endian)
//!   magic "IPLT" | format u16 | ip_version u8 | reserved u8
//!   generation i64 | node_count u32 | data_count u32
//! nodes   node_count × [left u32, right u32]
//! data    data_count × [len u32, bytes]
//! ```
//!
//! 指针：`u32::MAX` 为空，最高位置 1 表示数据下标，其余为节点编号。

use bytes::{Buf, BufMut};

use crate::errors::{IpLocateError, Result};
use crate::storage::models::IpVersion;

pub const MAGIC: &[u8; 4] = b"IPLT";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_LEN: usize = 24;

const EMPTY: u32 = u32::MAX;
const DATA_FLAG: u32 = 0x8000_0000;

/// 单个节点可寻址的最大节点 / 数据下标
pub const MAX_INDEX: u32 = DATA_FLAG - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    Empty,
    Node(u32),
    Data(u32),
}

impl Pointer {
    pub fn encode(self) -> u32 {
        match self {
            Pointer::Empty => EMPTY,
            Pointer::Node(id) => id,
            Pointer::Data(idx) => DATA_FLAG | idx,
        }
    }

    pub fn decode(raw: u32) -> Self {
        if raw == EMPTY {
            Pointer::Empty
        } else if raw & DATA_FLAG != 0 {
            Pointer::Data(raw & !DATA_FLAG)
        } else {
            Pointer::Node(raw)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub ip_version: IpVersion,
    pub generation: i64,
    pub node_count: u32,
    pub data_count: u32,
}

impl Header {
    pub fn write_to(&self, out: &mut impl BufMut) {
        out.put_slice(MAGIC);
        out.put_u16_le(FORMAT_VERSION);
        out.put_u8(self.ip_version.number());
        out.put_u8(0);
        out.put_i64_le(self.generation);
        out.put_u32_le(self.node_count);
        out.put_u32_le(self.data_count);
    }

    pub fn read_from(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < HEADER_LEN {
            return Err(IpLocateError::codec("trie file is shorter than its header"));
        }

        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(IpLocateError::codec("not a trie file (bad magic)"));
        }

        let format = buf.get_u16_le();
        if format != FORMAT_VERSION {
            return Err(IpLocateError::codec(format!(
                "unsupported trie format version {}",
                format
            )));
        }

        let raw_version = buf.get_u8();
        let ip_version = IpVersion::from_number(raw_version).ok_or_else(|| {
            IpLocateError::codec(format!("invalid ip version {} in trie header", raw_version))
        })?;
        let _reserved = buf.get_u8();

        Ok(Self {
            ip_version,
            generation: buf.get_i64_le(),
            node_count: buf.get_u32_le(),
            data_count: buf.get_u32_le(),
        })
    }
}
