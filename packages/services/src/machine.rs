//! Service State Machine.
//!
//! The authoritative table of legal commands and transitions for one service.
//!
//! Commands come from callers and are either accepted with a [`Plan`] or rejected with a
//! [`Refusal`]; rejected commands are never queued. Events come from the supervisor itself while it
//! carries a plan out, and always map to exactly one next state.
use derive_more::Display;
use hxe_primitives::{ServiceRecord, ServiceSpec, ServiceState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry;

/// A control command, without its payload.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    #[display("start")]
    Start,
    #[display("stop")]
    Stop,
    #[display("restart")]
    Restart,
    #[display("enable")]
    Enable,
    #[display("disable")]
    Disable,
    #[display("reload")]
    Reload,
    #[display("update")]
    Update,
    #[display("delete")]
    Delete { force: bool },
}

/// What the supervisor has to do to honour an accepted command.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Plan {
    /// Spawn a new process, cancelling any pending retry.
    Launch,
    /// Nothing to do: the current record is the answer.
    Unchanged,
    /// Stop the live process, or cancel the pending retry when there is none.
    Halt,
    /// Halt, then launch again.
    Cycle,
    /// Set `enabled`; a failed record also gets its retries back.
    Enable,
    /// Clear `enabled`.
    Disable,
    /// Replace the spec, leaving the state and the live process untouched.
    Refresh,
    /// Remove the spec and the record.
    Remove,
    /// Halt, then remove the spec and the record.
    HaltThenRemove,
}

/// Why a command was rejected.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Refusal {
    #[error("cannot {command} a service that is {state}")]
    InvalidTransition { state: ServiceState, command: Command },

    #[error("cannot delete a service that is {state} without stopping it first")]
    Conflict { state: ServiceState },

    #[error("cannot {command} a service that failed after exhausting its {max_retries} retries")]
    RetryExhausted { command: Command, max_retries: u32 },
}

/// Internal lifecycle events, produced by the supervisor while it carries out a plan or observes a
/// process.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum Event {
    /// A spawn is about to be attempted.
    Launch,
    /// The spawn returned a PID.
    Spawned,
    /// The spawn of an explicitly requested start failed.
    SpawnFailed,
    /// The spawn of an automatic restart failed; the retry policy decides what follows.
    Relapse,
    /// A stop sequence begins.
    Halt,
    /// The stopped process has exited.
    Halted,
    /// The process exited with a non-zero code on its own.
    Crashed,
    /// A one-shot process exited with code `0`.
    Completed,
    /// A long-running process exited with code `0` on its own.
    Finished,
    /// The retry policy scheduled a restart.
    Backoff,
    /// The retry policy gave up, or the service is disabled.
    Exhausted,
    /// A pending restart was cancelled.
    Cancelled,
    /// The record was recovered at startup with a process whose liveness is unknown.
    Orphaned,
    /// The liveness check found the process.
    Alive,
    /// The liveness check did not find the process.
    Dead,
}

/// An event that cannot happen in the given state.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
#[error("the event {event} is not expected while {state}")]
pub struct Unexpected {
    pub state: ServiceState,
    pub event: Event,
}

/// Validates a command against the current record.
///
/// # Errors
///
/// Will return a [`Refusal`] if the command is not legal in the current state.
pub fn on_command(record: &ServiceRecord, spec: &ServiceSpec, command: Command) -> Result<Plan, Refusal> {
    use ServiceState::{Failed, Ready, Restarting, Running, Starting, Stopped, Success};

    let state = record.state;
    let invalid = Refusal::InvalidTransition { state, command };

    let plan = match command {
        Command::Start => match state {
            Ready | Stopped | Failed | Success | Restarting => Plan::Launch,
            Starting | Running => Plan::Unchanged,
            _ => return Err(invalid),
        },
        Command::Stop => match state {
            Starting | Running | Restarting => Plan::Halt,
            _ => return Err(refuse_exhausted(record, spec, command).unwrap_or(invalid)),
        },
        Command::Restart => match state {
            Starting | Running | Restarting => Plan::Cycle,
            _ => return Err(refuse_exhausted(record, spec, command).unwrap_or(invalid)),
        },
        Command::Enable => Plan::Enable,
        Command::Disable => match state {
            Ready | Stopped | Failed | Success => Plan::Disable,
            _ => return Err(invalid),
        },
        Command::Reload | Command::Update => Plan::Refresh,
        Command::Delete { force } => match (state.is_running(), force) {
            (false, _) if state != ServiceState::Stopping => Plan::Remove,
            (true, true) => Plan::HaltThenRemove,
            (true, false) => return Err(Refusal::Conflict { state }),
            (false, _) => return Err(invalid),
        },
    };

    Ok(plan)
}

fn refuse_exhausted(record: &ServiceRecord, spec: &ServiceSpec, command: Command) -> Option<Refusal> {
    (record.state == ServiceState::Failed && retry::is_exhausted(record, spec)).then_some(Refusal::RetryExhausted {
        command,
        max_retries: spec.max_retries,
    })
}

/// Returns the state that follows an internal event.
///
/// # Errors
///
/// Will return [`Unexpected`] if the event cannot happen in the given state.
pub fn on_event(state: ServiceState, event: Event) -> Result<ServiceState, Unexpected> {
    use ServiceState::{Failed, Ready, Restarting, Running, Starting, Stopped, Stopping, Success, Unknown};

    let next = match (state, event) {
        (Ready | Stopped | Failed | Success | Restarting, Event::Launch) => Starting,
        (Starting, Event::Spawned) => Running,
        (Starting, Event::SpawnFailed) => Failed,
        (Starting, Event::Relapse) | (Running, Event::Crashed) => Stopping,
        (Starting | Running, Event::Halt) => Stopping,
        (Stopping, Event::Halted) | (Running, Event::Finished) | (Restarting, Event::Cancelled) => Stopped,
        (Running, Event::Completed) => Success,
        (Stopping, Event::Backoff) => Restarting,
        (Stopping, Event::Exhausted) => Failed,
        (Starting | Running | Stopping | Restarting, Event::Orphaned) => Unknown,
        (Unknown, Event::Alive) => Running,
        (Unknown, Event::Dead) => Stopped,
        (state, event) => return Err(Unexpected { state, event }),
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use hxe_primitives::{ServiceId, ServiceRecord, ServiceSpec, ServiceState};

    use super::{on_command, Command, Plan, Refusal};

    const ALL_STATES: [ServiceState; 10] = [
        ServiceState::Ready,
        ServiceState::Loading,
        ServiceState::Starting,
        ServiceState::Running,
        ServiceState::Stopping,
        ServiceState::Stopped,
        ServiceState::Restarting,
        ServiceState::Failed,
        ServiceState::Success,
        ServiceState::Unknown,
    ];

    fn spec() -> ServiceSpec {
        let mut spec = ServiceSpec::new(ServiceId::new("svc").unwrap(), "svc", "true");
        spec.max_retries = 2;
        spec
    }

    fn record(state: ServiceState) -> ServiceRecord {
        let mut record = ServiceRecord::ready(ServiceId::new("svc").unwrap());
        record.state = state;
        record
    }

    fn plan(state: ServiceState, command: Command) -> Result<Plan, Refusal> {
        on_command(&record(state), &spec(), command)
    }

    mod commands {
        use hxe_primitives::ServiceState;

        use super::{plan, record, spec, ALL_STATES};
        use crate::machine::{on_command, Command, Plan, Refusal};

        #[test]
        fn it_should_launch_from_the_states_without_a_live_process() {
            for state in [
                ServiceState::Ready,
                ServiceState::Stopped,
                ServiceState::Failed,
                ServiceState::Success,
                ServiceState::Restarting,
            ] {
                assert_eq!(plan(state, Command::Start), Ok(Plan::Launch), "{state}");
            }
        }

        #[test]
        fn it_should_treat_a_start_of_a_running_service_as_a_no_op() {
            assert_eq!(plan(ServiceState::Running, Command::Start), Ok(Plan::Unchanged));
            assert_eq!(plan(ServiceState::Starting, Command::Start), Ok(Plan::Unchanged));
        }

        #[test]
        fn it_should_refuse_to_start_a_service_whose_liveness_is_unknown() {
            assert_eq!(
                plan(ServiceState::Unknown, Command::Start),
                Err(Refusal::InvalidTransition {
                    state: ServiceState::Unknown,
                    command: Command::Start
                })
            );
        }

        #[test]
        fn it_should_only_stop_or_restart_running_ish_services() {
            for state in ALL_STATES {
                let expected = state.is_running();

                assert_eq!(plan(state, Command::Stop).is_ok(), expected, "stop {state}");
                assert_eq!(plan(state, Command::Restart).is_ok(), expected, "restart {state}");
            }
        }

        #[test]
        fn it_should_report_exhausted_retries_when_stopping_a_failed_service() {
            let mut failed = record(ServiceState::Failed);
            failed.retry_count = 2;

            assert_eq!(
                on_command(&failed, &spec(), Command::Restart),
                Err(Refusal::RetryExhausted {
                    command: Command::Restart,
                    max_retries: 2
                })
            );

            failed.retry_count = 1;

            assert!(matches!(
                on_command(&failed, &spec(), Command::Stop),
                Err(Refusal::InvalidTransition { .. })
            ));
        }

        #[test]
        fn it_should_enable_from_any_state_and_disable_only_when_idle() {
            for state in ALL_STATES {
                assert_eq!(plan(state, Command::Enable), Ok(Plan::Enable));
                assert_eq!(plan(state, Command::Disable).is_ok(), state.is_terminal() || state == ServiceState::Ready);
            }
        }

        #[test]
        fn it_should_refresh_the_spec_without_caring_about_the_state() {
            for state in ALL_STATES {
                assert_eq!(plan(state, Command::Reload), Ok(Plan::Refresh));
                assert_eq!(plan(state, Command::Update), Ok(Plan::Refresh));
            }
        }

        #[test]
        fn it_should_refuse_to_delete_a_running_service_unless_forced() {
            assert_eq!(
                plan(ServiceState::Running, Command::Delete { force: false }),
                Err(Refusal::Conflict {
                    state: ServiceState::Running
                })
            );
            assert_eq!(
                plan(ServiceState::Restarting, Command::Delete { force: true }),
                Ok(Plan::HaltThenRemove)
            );
            assert_eq!(plan(ServiceState::Stopped, Command::Delete { force: false }), Ok(Plan::Remove));
            assert_eq!(plan(ServiceState::Unknown, Command::Delete { force: false }), Ok(Plan::Remove));
        }
    }

    mod events {
        use hxe_primitives::ServiceState;

        use super::ALL_STATES;
        use crate::machine::{on_event, Event, Unexpected};

        #[test]
        fn it_should_go_through_starting_before_running() {
            let starting = on_event(ServiceState::Stopped, Event::Launch).unwrap();

            assert_eq!(starting, ServiceState::Starting);
            assert_eq!(on_event(starting, Event::Spawned), Ok(ServiceState::Running));
            assert_eq!(on_event(starting, Event::SpawnFailed), Ok(ServiceState::Failed));
        }

        #[test]
        fn it_should_clean_up_a_crash_before_deciding_about_a_retry() {
            let stopping = on_event(ServiceState::Running, Event::Crashed).unwrap();

            assert_eq!(stopping, ServiceState::Stopping);
            assert_eq!(on_event(stopping, Event::Backoff), Ok(ServiceState::Restarting));
            assert_eq!(on_event(stopping, Event::Exhausted), Ok(ServiceState::Failed));
            assert_eq!(on_event(ServiceState::Restarting, Event::Launch), Ok(ServiceState::Starting));
        }

        #[test]
        fn it_should_tell_one_shot_completion_from_a_clean_exit() {
            assert_eq!(on_event(ServiceState::Running, Event::Completed), Ok(ServiceState::Success));
            assert_eq!(on_event(ServiceState::Running, Event::Finished), Ok(ServiceState::Stopped));
        }

        #[test]
        fn it_should_resolve_recovered_records_through_unknown() {
            for state in ServiceState::WITH_PROCESS {
                assert_eq!(on_event(state, Event::Orphaned), Ok(ServiceState::Unknown));
            }

            assert_eq!(on_event(ServiceState::Unknown, Event::Alive), Ok(ServiceState::Running));
            assert_eq!(on_event(ServiceState::Unknown, Event::Dead), Ok(ServiceState::Stopped));
        }

        #[test]
        fn it_should_reject_events_that_cannot_happen() {
            assert_eq!(
                on_event(ServiceState::Stopped, Event::Crashed),
                Err(Unexpected {
                    state: ServiceState::Stopped,
                    event: Event::Crashed
                })
            );

            for state in ALL_STATES {
                assert!(on_event(state, Event::Spawned).is_ok() == (state == ServiceState::Starting));
            }
        }
    }
}
