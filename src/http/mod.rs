//! HTTP server module.
//!
//! Binds the configured address, serves the router, and drains in-flight
//! requests on SIGTERM/SIGINT. TLS is expected to terminate at a reverse
//! proxy in front of the service.

mod server;
mod shutdown;

pub use server::{start_server, ServerError};
