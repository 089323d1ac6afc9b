//! Testing helpers for the HXE process supervisor.
pub mod configuration;
pub mod fixtures;
pub mod random;
