//! The mutable runtime record of a managed service.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ServiceId, ServiceState};

/// The observed runtime state of one service.
///
/// Exactly one record exists per [`ServiceSpec`](crate::ServiceSpec), under the same id. It is owned
/// by the supervisor; no other component writes it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ServiceRecord {
    pub id: ServiceId,
    pub state: ServiceState,
    /// Non-zero if and only if `state` is one of [`ServiceState::WITH_PROCESS`].
    pub pid: u32,
    pub exit_code: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl ServiceRecord {
    /// The record of a freshly registered service.
    #[must_use]
    pub fn ready(id: ServiceId) -> Self {
        Self {
            id,
            state: ServiceState::Ready,
            pid: 0,
            exit_code: 0,
            started_at: None,
            ended_at: None,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Returns `true` if the PID agrees with the state.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        (self.pid != 0) == self.state.has_process()
    }
}
