//! Health Check HTTP API.
//!
//! A single endpoint, `GET /health_check`, used by the host infrastructure to
//! check the supervisor is answering on the bus. See [`resources::Report`].
pub mod handlers;
pub mod resources;
pub mod responses;
pub mod routes;
pub mod server;

pub const HEALTH_CHECK_API_LOG_TARGET: &str = "HEALTH CHECK API";
