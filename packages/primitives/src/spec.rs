//! The immutable definition of a managed service.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ServiceId;

/// Errors found while validating a [`ServiceSpec`].
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("the required field `{field}` is empty")]
    EmptyField { field: &'static str },

    #[error("the service id \"{id}\" contains the invalid character '{found}'")]
    InvalidId { id: String, found: char },

    #[error("the environment entry \"{entry}\" is not in the `KEY=VALUE` form")]
    MalformedEnv { entry: String },

    #[error("the service id \"{found}\" does not match the id \"{expected}\" it is stored under")]
    MismatchedId { expected: ServiceId, found: ServiceId },
}

/// How to launch a service.
///
/// The spec is created from configuration or by a control request, and is replaced wholesale on
/// update; it is never edited in place.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ServiceSpec {
    pub id: ServiceId,
    pub name: String,
    #[serde(default)]
    pub description: String,

    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Entries in the `KEY=VALUE` form.
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub run_as_user: Option<String>,
    #[serde(default)]
    pub run_as_group: Option<String>,

    /// Run through `sh -c` before the main command. A failure aborts the spawn.
    #[serde(default)]
    pub pre_exec: Option<String>,
    /// Run through `sh -c` after the main command exits. A failure is only logged.
    #[serde(default)]
    pub post_exec: Option<String>,

    #[serde(default)]
    pub autostart: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub max_retries: u32,
    /// A one-shot service that exits with code `0` has completed successfully.
    #[serde(default)]
    pub oneshot: bool,
}

fn default_enabled() -> bool {
    true
}

impl ServiceSpec {
    /// Creates a minimal spec, enabled, without retries.
    #[must_use]
    pub fn new(id: ServiceId, name: &str, command: &str) -> Self {
        Self {
            id,
            name: name.to_owned(),
            description: String::new(),
            command: command.to_owned(),
            args: Vec::new(),
            env: Vec::new(),
            working_directory: None,
            run_as_user: None,
            run_as_group: None,
            pre_exec: None,
            post_exec: None,
            autostart: false,
            enabled: true,
            max_retries: 0,
            oneshot: false,
        }
    }

    /// Checks the required fields and the shape of the environment.
    ///
    /// # Errors
    ///
    /// Will return the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "name" });
        }

        if self.command.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "command" });
        }

        if let Some(entry) = self.env.iter().find(|entry| !matches!(entry.split_once('='), Some((key, _)) if !key.is_empty())) {
            return Err(ValidationError::MalformedEnv { entry: entry.clone() });
        }

        Ok(())
    }

    /// Returns a copy with the empty optional fields normalised to `None`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        fn blank_to_none(value: &mut Option<String>) {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *value = None;
            }
        }

        blank_to_none(&mut self.run_as_user);
        blank_to_none(&mut self.run_as_group);
        blank_to_none(&mut self.pre_exec);
        blank_to_none(&mut self.post_exec);

        if self.working_directory.as_ref().is_some_and(|dir| dir.as_os_str().is_empty()) {
            self.working_directory = None;
        }

        self
    }

    /// The environment as `(key, value)` pairs. Malformed entries are skipped.
    pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().filter_map(|entry| entry.split_once('='))
    }
}
