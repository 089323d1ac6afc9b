//! The lifecycle states of a managed service.
use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of states a [`ServiceRecord`](crate::ServiceRecord) can be in.
///
/// - [`Ready`](ServiceState::Ready) is the initial state: the spec is registered and no process runs.
/// - [`Stopped`](ServiceState::Stopped), [`Failed`](ServiceState::Failed) and
///   [`Success`](ServiceState::Success) have no automatic outgoing transition.
/// - [`Unknown`](ServiceState::Unknown) is only used for records recovered at startup whose process
///   liveness has not been checked yet.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Display, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    #[default]
    #[display("ready")]
    Ready,
    #[display("loading")]
    Loading,
    #[display("starting")]
    Starting,
    #[display("running")]
    Running,
    #[display("stopping")]
    Stopping,
    #[display("stopped")]
    Stopped,
    #[display("restarting")]
    Restarting,
    #[display("failed")]
    Failed,
    #[display("success")]
    Success,
    #[display("unknown")]
    Unknown,
}

impl ServiceState {
    /// The states in which the record holds a non-zero PID.
    pub const WITH_PROCESS: [ServiceState; 4] = [Self::Starting, Self::Running, Self::Stopping, Self::Restarting];

    /// Returns `true` if a record in this state must carry a non-zero PID.
    #[must_use]
    pub fn has_process(self) -> bool {
        Self::WITH_PROCESS.contains(&self)
    }

    /// Returns `true` for the states where a process runs or is about to be relaunched.
    ///
    /// A service in one of these states cannot be deleted without stopping it first.
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Restarting)
    }

    /// Returns `true` for the states without an automatic outgoing transition.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed | Self::Success)
    }
}

/// The name does not belong to any [`ServiceState`].
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("\"{0}\" is not a service state")]
pub struct UnknownState(pub String);

impl FromStr for ServiceState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let state = match s {
            "ready" => Self::Ready,
            "loading" => Self::Loading,
            "starting" => Self::Starting,
            "running" => Self::Running,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            "restarting" => Self::Restarting,
            "failed" => Self::Failed,
            "success" => Self::Success,
            "unknown" => Self::Unknown,
            other => return Err(UnknownState(other.to_owned())),
        };

        Ok(state)
    }
}
