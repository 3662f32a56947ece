//! HTTP API for bill analysis.
//!
//! Exposes the analysis pipeline as JSON endpoints nested under `/api/`.
//! `api_router()` returns a `Router` that can be mounted on any axum server.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_api_server, ApiServer, ApiServerSession};
pub use types::ApiContext;
