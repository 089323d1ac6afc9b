//! Servers. Services that can be started and stopped.
pub mod gateway;
pub mod health_check_api;
pub mod logging;
pub mod signals;
