//! Services Lifecycle Package
//!
//! This package provides the pure decision logic used to supervise a service: which commands are
//! legal in which state, which state an internal event leads to, and whether a crashed service
//! should be restarted.
//!
//! The package is organized into two modules:
//!
//! - The [`machine`] module: the Service State Machine. [`on_command`] validates a control
//!   [`Command`] against the current record and answers with the [`Plan`] the supervisor must carry
//!   out, or a [`Refusal`]. [`on_event`] maps an internal [`Event`] (a spawn result, a process exit,
//!   a retry decision, ...) to the next [`ServiceState`](hxe_primitives::ServiceState).
//! - The [`retry`] module: the Retry Policy. [`RetryPolicy::decide`] looks at the failure history of a
//!   record and answers with a [`Decision`].
//!
//! Nothing in this package performs I/O; the supervisor owns the effects.
//!
//! The usual transitions are:
//!
//! - `ready | stopped | failed | success` + [`Command::Start`] → `starting` → `running`, or `failed`
//!   when the spawn fails.
//! - `running` + [`Command::Stop`] → `stopping` → `stopped`.
//! - `running` + non-zero exit → `stopping` → `restarting` (after a back-off) or `failed`.
//! - `running` + zero exit of a one-shot service → `success`.
pub mod machine;
pub mod retry;

pub use machine::{on_command, on_event, Command, Event, Plan, Refusal, Unexpected};
pub use retry::{Decision, RetryPolicy};
