//! Process Runner.
//!
//! A [`Runner`] turns a [`ServiceSpec`] into exactly one operating system
//! process and reports what happens to it:
//!
//! 1. [`Runner::spawn`] runs the `pre_exec` hook, launches the command and
//!    returns its PID together with a [`WaitHandle`].
//! 2. [`Runner::wait`] resolves when the process exits, runs the `post_exec`
//!    hook and reports the [`Exit`].
//! 3. [`Runner::signal`] asks the process (and its process group) to
//!    terminate, or kills it.
//!
//! A runner never touches the service record. The supervisor actor that owns
//! the service turns every outcome into a state transition.
pub mod os;

#[cfg(test)]
pub mod fake;

use std::sync::Arc;

use derive_more::Display;
use futures::future::BoxFuture;
use hxe_primitives::{ServiceId, ServiceSpec};
use thiserror::Error;

use super::journal::Journal;

pub use os::OsRunner;

pub const RUNNER_LOG_TARGET: &str = "RUNNER";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("the pre-exec command of \"{id}\" failed: {reason}")]
    PreExecFailed { id: ServiceId, reason: String },

    #[error("unable to spawn \"{id}\": {reason}")]
    Spawn { id: ServiceId, reason: String },

    #[error("unable to signal the process {pid}: {reason}")]
    Signal { pid: u32, reason: String },
}

#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum Signal {
    /// Ask the process to exit.
    #[display("SIGTERM")]
    Terminate,
    /// Force the process to exit.
    #[display("SIGKILL")]
    Kill,
}

/// How a process ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exit {
    /// The exit code, `128 + n` when killed by the signal `n`, or
    /// [`EXIT_CODE_UNKNOWN`](hxe_primitives::EXIT_CODE_UNKNOWN).
    pub code: i32,
    /// Why the exit code could not be observed, if it could not.
    pub error: Option<String>,
}

impl Exit {
    #[must_use]
    pub fn code(code: i32) -> Self {
        Self { code, error: None }
    }

    #[must_use]
    pub fn unknown(error: Option<String>) -> Self {
        Self {
            code: hxe_primitives::EXIT_CODE_UNKNOWN,
            error,
        }
    }
}

/// Resolves to the exit code of a spawned process.
pub struct WaitHandle(pub BoxFuture<'static, std::io::Result<i32>>);

impl std::fmt::Debug for WaitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WaitHandle")
    }
}

#[derive(Debug)]
pub struct Spawned {
    pub pid: u32,
    pub wait: WaitHandle,
}

pub trait Runner: Send + Sync + 'static {
    /// Runs the `pre_exec` hook and launches the command. The output of the
    /// command goes to the journal.
    ///
    /// # Errors
    ///
    /// Will return [`Error::PreExecFailed`] if the hook fails, or
    /// [`Error::Spawn`] if the command cannot be launched.
    fn spawn<'a>(&'a self, spec: &'a ServiceSpec, journal: Arc<Journal>) -> BoxFuture<'a, Result<Spawned, Error>>;

    /// Sends a signal to the process group led by `pid`.
    ///
    /// A process that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Will return [`Error::Signal`] if the signal cannot be delivered.
    fn signal(&self, pid: u32, signal: Signal) -> Result<(), Error>;

    /// Waits until the process exits, then runs the `post_exec` hook.
    fn wait(&self, handle: WaitHandle, spec: ServiceSpec) -> BoxFuture<'static, Exit>;

    /// Returns `true` if a process with this PID exists.
    fn is_alive(&self, pid: u32) -> bool;
}
