//! **HXE** is a host-based process supervisor.
//!
//! It starts, stops and restarts the services of a host, keeps their state in
//! a durable store and recovers it after a restart of the supervisor.
//!
//! # Components
//!
//! - [`core`]: the [`Supervisor`](crate::core::Supervisor). One actor per
//!   service owns its record, its process and its retry timer.
//! - [`bus`]: the subject based message bus the supervisor is controlled
//!   through.
//! - [`servers`]: the Control Protocol Gateway, answering the operations on the
//!   bus, and the Health Check API.
//! - [`bootstrap`] and [`app`]: loading the configuration and launching the
//!   jobs.
//!
//! The lifecycle state machine and the retry policy live in the
//! `hxe-services` package, the shared types in `hxe-primitives`, and the
//! configuration in `hxe-configuration`.
//!
//! # Configuration
//!
//! The configuration is loaded from a TOML file, by default
//! `./share/default/config/hxe.toml`. Another file can be given with
//! `--config` or the `HXE_CONFIG_TOML_PATH` environment variable, and the
//! whole file can be passed in `HXE_CONFIG_TOML`.
pub mod app;
pub mod bootstrap;
pub mod bus;
pub mod core;
pub mod servers;
