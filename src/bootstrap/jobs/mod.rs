//! Application jobs launchers.
//!
//! The main application setup has two main stages:
//!
//! 1. Setup the supervisor.
//! 2. Launch all the application jobs as independent asynchronous tasks.
//!
//! This module contains the launchers of those jobs.
pub mod gateway;
pub mod health_check_api;

use std::net::SocketAddr;

/// This is the message that the "launcher" spawned task sends to the main
/// application process to notify the service was successfully started.
#[derive(Debug)]
pub struct Started {
    pub local_addr: SocketAddr,
}
