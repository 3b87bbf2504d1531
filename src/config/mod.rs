//! Configuration management
//!
//! Static configuration is loaded once at startup from `config.toml` and
//! `IPL__*` environment variables, validated, and then owned by the
//! application context.

mod structs;

pub use structs::*;
