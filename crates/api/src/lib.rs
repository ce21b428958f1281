//! Event ingestion HTTP service.
//!
//! Exposes the building blocks (config, state, error handling, routes) so
//! integration tests and the binary entrypoint share the same router.

pub mod config;
pub mod connector;
pub mod error;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod state;
