//! API endpoint handlers.
//!
//! Handlers reuse the portal service's operations; no business logic
//! lives here.

pub mod health;
pub mod orders;
pub mod session;
