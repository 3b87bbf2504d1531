//! HTTP API
//!
//! Thin actix-web layer over the resolver and the refresh orchestrator.

pub mod middleware;
pub mod routes;

pub use middleware::{API_KEY_HEADER, ApiKey, ApiKeyAuth};
pub use routes::{LocateService, configure};
