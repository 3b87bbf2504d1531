use std::path::Path;

use bytes::{Buf, Bytes};

use super::format::{HEADER_LEN, Header, Pointer};
use crate::errors::{IpLocateError, Result};
use crate::storage::models::IpVersion;

/// 只读前缀树，整份文件驻留内存
pub struct TrieReader {
    header: Header,
    nodes: Vec<[Pointer; 2]>,
    buf: Bytes,
    /// 每条数据在 `buf` 中的 (起点, 长度)
    data: Vec<(usize, usize)>,
}

impl TrieReader {
    pub fn open(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path).map_err(|e| {
            IpLocateError::file_operation(format!("无法读取 {}: {}", path.display(), e))
        })?;
        Self::from_bytes(Bytes::from(raw))
    }

    pub fn from_bytes(buf: Bytes) -> Result<Self> {
        let mut cursor = buf.clone();
        let header = Header::read_from(&mut cursor)?;

        let node_bytes = header.node_count as usize * 8;
        if cursor.remaining() < node_bytes {
            return Err(IpLocateError::codec("trie node table is truncated"));
        }

        let mut nodes = Vec::with_capacity(header.node_count as usize);
        for _ in 0..header.node_count {
            let left = Pointer::decode(cursor.get_u32_le());
            let right = Pointer::decode(cursor.get_u32_le());
            for ptr in [left, right] {
                match ptr {
                    Pointer::Node(id) if id >= header.node_count => {
                        return Err(IpLocateError::codec(format!("node pointer {} out of range", id)));
                    }
                    Pointer::Data(idx) if idx >= header.data_count => {
                        return Err(IpLocateError::codec(format!("data pointer {} out of range", idx)));
                    }
                    _ => {}
                }
            }
            nodes.push([left, right]);
        }

        let mut data = Vec::with_capacity(header.data_count as usize);
        let mut offset = HEADER_LEN + node_bytes;
        for _ in 0..header.data_count {
            if cursor.remaining() < 4 {
                return Err(IpLocateError::codec("trie data table is truncated"));
            }
            let len = cursor.get_u32_le() as usize;
            offset += 4;
            if cursor.remaining() < len {
                return Err(IpLocateError::codec("trie data entry is truncated"));
            }
            cursor.advance(len);
            data.push((offset, len));
            offset += len;
        }

        Ok(Self {
            header,
            nodes,
            buf,
            data,
        })
    }

    pub fn generation(&self) -> i64 {
        self.header.generation
    }

    pub fn ip_version(&self) -> IpVersion {
        self.header.ip_version
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 查找覆盖 `number` 的最具体前缀的负载
    pub fn lookup(&self, number: u128) -> Option<&[u8]> {
        let bits = self.header.ip_version.bits();
        if number > self.header.ip_version.max_number() || self.nodes.is_empty() {
            return None;
        }

        let mut node = 0usize;
        for depth in 0..bits {
            let bit = ((number >> (bits - 1 - depth)) & 1) as usize;
            match self.nodes[node][bit] {
                Pointer::Empty => return None,
                Pointer::Data(idx) => return self.payload(idx as usize),
                Pointer::Node(child) => node = child as usize,
            }
        }
        None
    }

    fn payload(&self, idx: usize) -> Option<&[u8]> {
        let (start, len) = *self.data.get(idx)?;
        self.buf.get(start..start + len)
    }
}
