//! recolectad - HTTP server for the pickup-request pool.
//!
//! Thin transport layer over `recolecta-core`: the router maps the pool's
//! logical operations onto HTTP, translates the core error taxonomy into
//! the console's `{success, data | error, message}` envelope, and wires an
//! optional webhook notifier. All policy lives in the core.

pub mod api;
pub mod notifier;
