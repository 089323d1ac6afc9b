//! Errors returned by the [`Supervisor`](crate::core::Supervisor).
//!
//! Every error maps to a machine readable [`ErrorCode`], the one the control
//! protocol puts on the wire.
use derive_more::Display;
use hxe_primitives::{ServiceId, ValidationError};
use hxe_services::machine::{Refusal, Unexpected};
use serde::{Deserialize, Serialize};

use super::databases;
use super::runner;

/// The machine readable kind of a failed operation.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    #[display("VALIDATION_ERROR")]
    ValidationError,
    #[display("NOT_FOUND")]
    NotFound,
    #[display("INVALID_TRANSITION")]
    InvalidTransition,
    #[display("CONFLICT")]
    Conflict,
    #[display("PRE_EXEC_FAILED")]
    PreExecFailed,
    #[display("SPAWN_ERROR")]
    SpawnError,
    #[display("RETRY_EXHAUSTED")]
    RetryExhausted,
    #[display("TIMEOUT")]
    Timeout,
    #[display("STORAGE_ERROR")]
    StorageError,
    #[display("BAD_REQUEST")]
    BadRequest,
    #[display("UNAVAILABLE")]
    Unavailable,
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("invalid service spec: {source}")]
    Validation {
        #[from]
        source: ValidationError,
    },

    #[error("the service \"{id}\" does not exist")]
    NotFound { id: ServiceId },

    #[error("the service \"{id}\" already exists")]
    AlreadyExists { id: ServiceId },

    #[error("service \"{id}\": {refusal}")]
    Refused { id: ServiceId, refusal: Refusal },

    #[error(transparent)]
    Runner {
        #[from]
        source: runner::Error,
    },

    #[error("unable to persist the service \"{id}\": {source}")]
    Storage {
        id: ServiceId,
        source: databases::error::Error,
    },

    #[error("unable to load the stored services: {source}")]
    Load { source: databases::error::Error },

    #[error("the service \"{id}\" is shutting down")]
    Unavailable { id: ServiceId },

    #[error("service \"{id}\": {source}")]
    Unexpected { id: ServiceId, source: Unexpected },
}

impl Error {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Validation { .. } => ErrorCode::ValidationError,
            Error::NotFound { .. } => ErrorCode::NotFound,
            Error::AlreadyExists { .. } => ErrorCode::Conflict,
            Error::Refused { refusal, .. } => match refusal {
                Refusal::InvalidTransition { .. } => ErrorCode::InvalidTransition,
                Refusal::Conflict { .. } => ErrorCode::Conflict,
                Refusal::RetryExhausted { .. } => ErrorCode::RetryExhausted,
            },
            Error::Runner { source } => match source {
                runner::Error::PreExecFailed { .. } => ErrorCode::PreExecFailed,
                runner::Error::Spawn { .. } | runner::Error::Signal { .. } => ErrorCode::SpawnError,
            },
            Error::Storage { .. } | Error::Load { .. } => ErrorCode::StorageError,
            Error::Unavailable { .. } => ErrorCode::Unavailable,
            Error::Unexpected { .. } => ErrorCode::InvalidTransition,
        }
    }
}

#[cfg(test)]
mod tests {
    use hxe_primitives::{ServiceId, ServiceState};
    use hxe_services::machine::{Command, Refusal};

    use super::{Error, ErrorCode};
    use crate::core::runner;

    fn id() -> ServiceId {
        ServiceId::new("web").unwrap()
    }

    #[test]
    fn it_should_tell_a_refused_delete_from_an_invalid_transition() {
        let conflict = Error::Refused {
            id: id(),
            refusal: Refusal::Conflict {
                state: ServiceState::Running,
            },
        };

        let invalid = Error::Refused {
            id: id(),
            refusal: Refusal::InvalidTransition {
                state: ServiceState::Stopped,
                command: Command::Stop,
            },
        };

        assert_eq!(conflict.code(), ErrorCode::Conflict);
        assert_eq!(invalid.code(), ErrorCode::InvalidTransition);
    }

    #[test]
    fn it_should_keep_the_runner_failure_kind() {
        let pre_exec: Error = runner::Error::PreExecFailed {
            id: id(),
            reason: "exited with code 3".to_owned(),
        }
        .into();

        assert_eq!(pre_exec.code(), ErrorCode::PreExecFailed);
        assert_eq!(
            pre_exec.to_string(),
            "the pre-exec command of \"web\" failed: exited with code 3"
        );
    }

    #[test]
    fn it_should_serialize_the_codes_in_screaming_snake_case() {
        assert_eq!(serde_json::to_string(&ErrorCode::RetryExhausted).unwrap(), "\"RETRY_EXHAUSTED\"");
        assert_eq!(ErrorCode::StorageError.to_string(), "STORAGE_ERROR");
    }
}
