//! Setup for the main supervisor application.
//!
//! The [`app`] module contains the steps needed to build the supervisor from
//! the configuration and the [`jobs`] module the long running tasks that
//! expose it.
pub mod app;
pub mod jobs;
pub mod tracing;
