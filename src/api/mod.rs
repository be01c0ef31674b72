//! Local REST API.
//!
//! Thin transport over the portal service: every endpoint translates one
//! core operation and maps its result to an HTTP response. Routes are
//! nested under `/api/`.
//!
//! The router is composable — `portal_api_router()` returns a `Router`
//! that can be mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::portal_api_router;
pub use server::{start_api_server, ApiServer};
pub use types::ApiContext;
