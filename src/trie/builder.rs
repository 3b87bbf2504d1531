//! 内存中的二叉前缀树
//!
//! 节点放在 arena 里，边指针携带前缀长度，用于在插入顺序任意时保证
//! 更具体的前缀覆盖更宽泛的前缀。`finish` 把整棵树编码成文件字节。

use bytes::BufMut;

use super::cidr::range_to_cidrs;
use super::format::{Header, MAX_INDEX, Pointer, HEADER_LEN};
use crate::errors::{IpLocateError, Result};
use crate::storage::models::IpVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Empty,
    Node(u32),
    /// (数据下标, 前缀长度)
    Data(u32, u8),
}

impl Edge {
    fn to_pointer(self) -> Pointer {
        match self {
            Edge::Empty => Pointer::Empty,
            Edge::Node(id) => Pointer::Node(id),
            Edge::Data(idx, _) => Pointer::Data(idx),
        }
    }
}

pub struct TrieBuilder {
    version: IpVersion,
    nodes: Vec<[Edge; 2]>,
    data: Vec<Vec<u8>>,
}

impl TrieBuilder {
    pub fn new(version: IpVersion) -> Self {
        Self {
            version,
            nodes: vec![[Edge::Empty; 2]],
            data: Vec::new(),
        }
    }

    pub fn ip_version(&self) -> IpVersion {
        self.version
    }

    /// 已插入的区间数
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// 插入闭区间 `[start, end]` 及其负载
    pub fn insert_range(&mut self, start: u128, end: u128, payload: Vec<u8>) -> Result<()> {
        let max = self.version.max_number();
        if start > end || end > max {
            return Err(IpLocateError::codec(format!(
                "range {}..={} is not valid for {}",
                start, end, self.version
            )));
        }
        if self.data.len() as u64 >= MAX_INDEX as u64 {
            return Err(IpLocateError::codec("trie data table is full"));
        }

        let idx = self.data.len() as u32;
        self.data.push(payload);

        for (network, prefix_len) in range_to_cidrs(start, end, self.version.bits()) {
            self.insert_prefix(network, prefix_len, idx)?;
        }
        Ok(())
    }

    fn insert_prefix(&mut self, network: u128, prefix_len: u8, idx: u32) -> Result<()> {
        let bits = self.version.bits();
        let leaf = Edge::Data(idx, prefix_len);

        if prefix_len == 0 {
            self.backfill(0, idx, prefix_len);
            return Ok(());
        }

        let mut node = 0usize;
        for depth in 0..prefix_len as u32 {
            let bit = ((network >> (bits - 1 - depth)) & 1) as usize;
            let edge = self.nodes[node][bit];

            if depth + 1 == prefix_len as u32 {
                match edge {
                    Edge::Empty => self.nodes[node][bit] = leaf,
                    Edge::Data(_, existing) if prefix_len >= existing => {
                        self.nodes[node][bit] = leaf;
                    }
                    Edge::Data(..) => {}
                    Edge::Node(child) => self.backfill(child as usize, idx, prefix_len),
                }
                return Ok(());
            }

            node = match edge {
                Edge::Node(child) => child as usize,
                Edge::Empty => {
                    let child = self.allocate([Edge::Empty; 2])?;
                    self.nodes[node][bit] = Edge::Node(child);
                    child as usize
                }
                // 更宽泛的前缀已占据此边，拆分后继续下探
                Edge::Data(..) => {
                    let child = self.allocate([edge; 2])?;
                    self.nodes[node][bit] = Edge::Node(child);
                    child as usize
                }
            };
        }
        Ok(())
    }

    /// 子树中空边及更宽泛的数据边改指向 `idx`
    fn backfill(&mut self, root: usize, idx: u32, prefix_len: u8) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            for bit in 0..2 {
                match self.nodes[node][bit] {
                    Edge::Empty => self.nodes[node][bit] = Edge::Data(idx, prefix_len),
                    Edge::Data(_, existing) if prefix_len > existing => {
                        self.nodes[node][bit] = Edge::Data(idx, prefix_len);
                    }
                    Edge::Data(..) => {}
                    Edge::Node(child) => stack.push(child as usize),
                }
            }
        }
    }

    fn allocate(&mut self, edges: [Edge; 2]) -> Result<u32> {
        if self.nodes.len() as u64 >= MAX_INDEX as u64 {
            return Err(IpLocateError::codec("trie node table is full"));
        }
        let id = self.nodes.len() as u32;
        self.nodes.push(edges);
        Ok(id)
    }

    /// 编码为文件字节
    pub fn finish(self, generation: i64) -> Vec<u8> {
        let data_len: usize = self.data.iter().map(|d| 4 + d.len()).sum();
        let mut out = Vec::with_capacity(HEADER_LEN + self.nodes.len() * 8 + data_len);

        Header {
            ip_version: self.version,
            generation,
            node_count: self.nodes.len() as u32,
            data_count: self.data.len() as u32,
        }
        .write_to(&mut out);

        for [left, right] in &self.nodes {
            out.put_u32_le(left.to_pointer().encode());
            out.put_u32_le(right.to_pointer().encode());
        }
        for payload in &self.data {
            out.put_u32_le(payload.len() as u32);
            out.put_slice(payload);
        }
        out
    }
}
