//! iplocate - IP geolocation and ASN lookup service
//!
//! Resolves an address to country / city / ASN attributes from datasets that
//! are periodically re-downloaded and swapped in without interrupting lookups.
//!
//! # Architecture
//! - `storage`: versioned range stores (relational via sea-orm, or prefix-trie files)
//! - `trie`: the prefix-trie file builder, codec and reader
//! - `services`: fetching, row transformation, resolution and refresh orchestration
//! - `api`: HTTP handlers and the shared-secret gate
//! - `config`: configuration loading and validation
//! - `runtime`: application context, lifecycle and execution modes
//! - `system`: logging

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod runtime;
pub mod services;
pub mod storage;
pub mod system;
pub mod trie;
pub mod utils;
