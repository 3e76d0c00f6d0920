//! # RSAT Server
//!
//! REST endpoints wrapping RSAT command-line tools. Each configured tool is a
//! [`tools::ToolService`]; [`web::router`] exposes them over HTTP.

pub mod tools;
pub mod web;

pub use tools::{Invocation, ToolRegistry, ToolService};
pub use web::{router, AppState};
