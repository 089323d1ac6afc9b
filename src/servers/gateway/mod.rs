//! Control Protocol Gateway.
//!
//! Exposes the [`Supervisor`](crate::core::Supervisor) on the message bus.
//! Every operation is a request on its own subject,
//! `<prefix>.service.<operation>`, answered with a JSON document. See
//! [`protocol`] for the wire contract.
//!
//! Besides answering requests, the gateway republishes the committed changes
//! of every service on `<prefix>.event.<id>` and the live lines of followed
//! logs on `<prefix>.log.<handle>`.
pub mod backend;
pub mod client;
pub mod handlers;
pub mod protocol;
pub mod server;

pub const GATEWAY_LOG_TARGET: &str = "GATEWAY";
