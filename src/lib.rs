//! # RSAT REST
//!
//! Workspace root. Hosts the end-to-end tests that drive the HTTP layer
//! against real child processes.
//!
//! - [`rsat_shared`]: configuration, schemas, command assembly and execution
//! - [`rsat_server`]: tool registry, axum router and the `rsat-server` binary

pub use rsat_server;
pub use rsat_shared;
