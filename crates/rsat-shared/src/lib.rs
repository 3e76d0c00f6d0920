//! # RSAT Shared
//!
//! Building blocks shared by the RSAT REST services:
//!
//! - [`config`]: layered service configuration
//! - [`schema`]: per-tool parameter schemas loaded from YAML
//! - [`params`]: typed, ordered request parameters
//! - [`staging`]: per-request result directories and file staging
//! - [`command`]: pure command-line assembly
//! - [`execution`]: synchronous and background process execution
//! - [`errors`] and [`logging`]

pub mod command;
pub mod config;
pub mod errors;
pub mod execution;
pub mod logging;
pub mod params;
pub mod schema;
pub mod staging;

pub use errors::{ServiceError, ServiceResult};
