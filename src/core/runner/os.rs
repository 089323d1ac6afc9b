//! The Process Runner backed by the host operating system.
use std::os::unix::process::{CommandExt as _, ExitStatusExt as _};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt as _;
use hxe_primitives::ServiceSpec;
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal as OsSignal};
use nix::unistd::{Group, Pid, User};
use tokio::io::{AsyncBufReadExt as _, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinSet;

use super::{Error, Exit, Runner, Signal, Spawned, WaitHandle, RUNNER_LOG_TARGET};
use crate::core::journal::{Journal, Line, Stream};

/// Time given to the output readers to drain the pipes once the process is
/// gone. A grandchild may keep the pipes open much longer.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

const SHELL: &str = "sh";

/// Spawns services as child processes of the supervisor, each one leading its
/// own process group.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRunner;

impl OsRunner {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// The identity a service runs as.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Identity {
    uid: Option<u32>,
    gid: Option<u32>,
}

fn resolve_identity(spec: &ServiceSpec) -> Result<Identity, Error> {
    let spawn_error = |reason: String| Error::Spawn {
        id: spec.id.clone(),
        reason,
    };

    let user = match spec.run_as_user.as_deref() {
        Some(name) => Some(
            User::from_name(name)
                .map_err(|e| spawn_error(format!("unable to look up the user \"{name}\": {e}")))?
                .ok_or_else(|| spawn_error(format!("the user \"{name}\" does not exist")))?,
        ),
        None => None,
    };

    let gid = match spec.run_as_group.as_deref() {
        Some(name) => Some(
            Group::from_name(name)
                .map_err(|e| spawn_error(format!("unable to look up the group \"{name}\": {e}")))?
                .ok_or_else(|| spawn_error(format!("the group \"{name}\" does not exist")))?
                .gid
                .as_raw(),
        ),
        None => user.as_ref().map(|user| user.gid.as_raw()),
    };

    Ok(Identity {
        uid: user.map(|user| user.uid.as_raw()),
        gid,
    })
}

/// Builds the command for a program line. Without arguments the line goes
/// through the shell, so `sleep 100` or `a && b` work as written.
fn command(spec: &ServiceSpec, program: &str, args: &[String], identity: Identity) -> Command {
    let mut std = if args.is_empty() {
        let mut std = std::process::Command::new(SHELL);
        std.arg("-c").arg(program);
        std
    } else {
        let mut std = std::process::Command::new(program);
        std.args(args);
        std
    };

    std.envs(spec.env_pairs()).process_group(0);

    if let Some(directory) = &spec.working_directory {
        std.current_dir(directory);
    }

    if let Some(gid) = identity.gid {
        std.gid(gid);
    }

    if let Some(uid) = identity.uid {
        std.uid(uid);
    }

    let mut command = Command::from(std);
    command.stdin(Stdio::null()).kill_on_drop(false);
    command
}

/// Runs a `pre_exec` or `post_exec` hook to completion.
async fn run_hook(spec: &ServiceSpec, hook: &str, identity: Identity) -> Result<(), String> {
    let output = command(spec, hook, &[], identity)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| e.to_string())?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();

    if stderr.is_empty() {
        Err(format!("exited with code {}", exit_code(output.status)))
    } else {
        Err(format!("exited with code {}: {stderr}", exit_code(output.status)))
    }
}

/// The exit code of a status, `128 + n` for the signal `n`.
fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => hxe_primitives::EXIT_CODE_UNKNOWN,
    }
}

/// Copies the lines of a pipe into the journal.
async fn copy_lines<R>(pipe: R, pid: u32, stream: Stream, journal: Arc<Journal>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(pipe).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(text)) => journal.push(Line::new(pid, stream, text)),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(target: RUNNER_LOG_TARGET, pid, %stream, err = %e, "stopped reading output");
                break;
            }
        }
    }
}

fn to_pid(pid: u32) -> Result<Pid, Errno> {
    i32::try_from(pid).map(Pid::from_raw).map_err(|_| Errno::EINVAL)
}

impl Runner for OsRunner {
    fn spawn<'a>(&'a self, spec: &'a ServiceSpec, journal: Arc<Journal>) -> BoxFuture<'a, Result<Spawned, Error>> {
        async move {
            let identity = resolve_identity(spec)?;

            if let Some(hook) = spec.pre_exec.as_deref() {
                run_hook(spec, hook, identity).await.map_err(|reason| Error::PreExecFailed {
                    id: spec.id.clone(),
                    reason,
                })?;
            }

            let mut child = command(spec, &spec.command, &spec.args, identity)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| Error::Spawn {
                    id: spec.id.clone(),
                    reason: e.to_string(),
                })?;

            let pid = child.id().ok_or_else(|| Error::Spawn {
                id: spec.id.clone(),
                reason: "the process exited before its id could be read".to_owned(),
            })?;

            let mut readers = JoinSet::new();

            if let Some(stdout) = child.stdout.take() {
                readers.spawn(copy_lines(stdout, pid, Stream::Stdout, journal.clone()));
            }

            if let Some(stderr) = child.stderr.take() {
                readers.spawn(copy_lines(stderr, pid, Stream::Stderr, journal));
            }

            tracing::info!(target: RUNNER_LOG_TARGET, id = %spec.id, pid, "spawned");

            let wait = async move {
                let status = child.wait().await?;

                let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
                    while readers.join_next().await.is_some() {}
                })
                .await;

                if drained.is_err() {
                    tracing::debug!(target: RUNNER_LOG_TARGET, pid, "output still open after exit");
                    readers.abort_all();
                }

                Ok(exit_code(status))
            }
            .boxed();

            Ok(Spawned {
                pid,
                wait: WaitHandle(wait),
            })
        }
        .boxed()
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<(), Error> {
        let os_signal = match signal {
            Signal::Terminate => OsSignal::SIGTERM,
            Signal::Kill => OsSignal::SIGKILL,
        };

        let delivered = to_pid(pid).and_then(|target| match killpg(target, os_signal) {
            // Not a group leader (an adopted process): signal it alone.
            Err(Errno::ESRCH) => kill(target, os_signal),
            result => result,
        });

        match delivered {
            Ok(()) | Err(Errno::ESRCH) => {
                tracing::debug!(target: RUNNER_LOG_TARGET, pid, %signal, "signalled");
                Ok(())
            }
            Err(e) => Err(Error::Signal {
                pid,
                reason: e.to_string(),
            }),
        }
    }

    fn wait(&self, handle: WaitHandle, spec: ServiceSpec) -> BoxFuture<'static, Exit> {
        async move {
            let exit = match handle.0.await {
                Ok(code) => Exit::code(code),
                Err(e) => Exit::unknown(Some(format!("unable to wait for the process: {e}"))),
            };

            if let Some(hook) = spec.post_exec.as_deref() {
                let result = match resolve_identity(&spec) {
                    Ok(identity) => run_hook(&spec, hook, identity).await,
                    Err(e) => Err(e.to_string()),
                };

                if let Err(reason) = result {
                    tracing::warn!(target: RUNNER_LOG_TARGET, id = %spec.id, reason, "the post-exec command failed");
                }
            }

            exit
        }
        .boxed()
    }

    fn is_alive(&self, pid: u32) -> bool {
        match to_pid(pid) {
            Ok(target) => matches!(kill(target, None), Ok(()) | Err(Errno::EPERM)),
            Err(_) => false,
        }
    }
}
