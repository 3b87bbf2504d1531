//! Prefix-trie file codec
//!
//! Ranges are split into CIDR blocks and stored in a binary trie; the trie
//! is serialized to one flat file per (dataset, IP version) and read back
//! fully into memory.

pub mod builder;
pub mod cidr;
pub mod format;
pub mod reader;

pub use builder::TrieBuilder;
pub use cidr::range_to_cidrs;
pub use reader::TrieReader;
