//! Primitive types for the [HXE](https://docs.rs/hxe) process supervisor.
//!
//! This package contains the canonical data model shared by every other package:
//!
//! - [`ServiceId`]: the stable identifier of a managed service.
//! - [`ServiceSpec`]: the immutable definition of how to launch a service. It is replaced
//!   wholesale on update.
//! - [`ServiceRecord`]: the mutable runtime record of a service. Only the supervisor writes it.
//! - [`ServiceState`]: the closed set of lifecycle states a record can be in.
use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};

pub mod record;
pub mod spec;
pub mod state;

pub use record::ServiceRecord;
pub use spec::{ServiceSpec, ValidationError};
pub use state::{ServiceState, UnknownState};

/// The exit code recorded when the real one cannot be observed.
pub const EXIT_CODE_UNKNOWN: i32 = -1;

/// The stable, unique identifier of a service.
///
/// It is shared by the [`ServiceSpec`] and the [`ServiceRecord`] of the same service.
#[derive(Serialize, Deserialize, Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String")]
pub struct ServiceId(String);

impl ServiceId {
    /// Creates a new identifier.
    ///
    /// # Errors
    ///
    /// Will return a [`ValidationError`] if the identifier is empty or contains a character that is
    /// not an ASCII alphanumeric, `-`, `_` or `.`.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();

        if id.is_empty() {
            return Err(ValidationError::EmptyField { field: "id" });
        }

        if let Some(found) = id.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))) {
            return Err(ValidationError::InvalidId { id, found });
        }

        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ServiceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServiceId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for ServiceId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
