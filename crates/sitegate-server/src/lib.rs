//! SiteGate HTTP server.
//!
//! Wires the login flow from `sitegate-auth` to the in-memory stores from
//! `sitegate-db-memory` and serves the login endpoints with axum.

pub mod config;
pub mod observability;
pub mod server;

pub use server::{AppServices, ServerBuilder, SitegateServer, build_app, router};
