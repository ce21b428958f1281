//! Domain types shared by the ingestion service crates.
//!
//! - [`event`]: raw and enriched event values plus the enrichment step.
//! - [`validation`]: field checks applied to inbound events.
//! - [`config`]: broker and service configuration loaded from the environment.

pub mod config;
pub mod error;
pub mod event;
pub mod types;
pub mod validation;
