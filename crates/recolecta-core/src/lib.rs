//! recolecta-core library.
//!
//! Domain model, durable request store, and claim arbiter for the
//! pickup-request pool. Every state mutation funnels through the
//! store's conditional-update primitive; the arbiter is the only
//! component that moves a request out of `pending`.
//!
//! # Conventions
//!
//! - **Errors**: typed [`error::RequestError`] in the core, `anyhow::Result`
//!   at binary edges.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `error!`, `debug!`).

pub mod arbiter;
pub mod config;
pub mod error;
pub mod intake;
pub mod model;
pub mod notify;
pub mod query;
pub mod store;
