//! Service layer
//!
//! Fetching, transforming, resolving and refreshing. Shared by the HTTP API
//! and the CLI commands.

pub mod fetch;
pub mod refresh;
pub mod resolver;
pub mod transform;

pub use fetch::{FetchOutcome, Fetcher, HttpFetcher};
pub use refresh::{RefreshOrchestrator, RefreshOutcome, RefreshReport, RefreshState};
pub use resolver::{ResolvedLocation, Resolver};
pub use transform::{RecordTransformer, TransformStats};
