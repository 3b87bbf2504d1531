//! Application lifecycle
//!
//! - `context`: the shared components every mode works against
//! - `lifetime`: startup / shutdown orchestration for the server
//! - `modes`: server and one-shot CLI entry points

pub mod context;
pub mod lifetime;
pub mod modes;

pub use context::AppContext;
