//! An in-memory runner for the supervisor tests.
//!
//! It understands the commands of the test fixtures: `exit <n>` and `true`
//! end as soon as they are waited on, a command containing `trap '' TERM`
//! ignores [`Signal::Terminate`], and anything else runs until it is
//! signalled or [`FakeRunner::finish`] is called.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt as _;
use hxe_primitives::{ServiceId, ServiceSpec};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::{Error, Exit, Runner, Signal, Spawned, WaitHandle};
use crate::core::journal::{Journal, Line, Stream};

const FIRST_PID: u32 = 1000;

struct Process {
    id: ServiceId,
    stubborn: bool,
    exit: oneshot::Sender<i32>,
}

#[derive(Default)]
pub struct FakeRunner {
    next_pid: AtomicU32,
    processes: Mutex<HashMap<u32, Process>>,
    foreign: Mutex<HashSet<u32>>,
    failing: Mutex<HashSet<ServiceId>>,
    spawned: Mutex<Vec<(ServiceId, u32)>>,
}

impl FakeRunner {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_pid: AtomicU32::new(FIRST_PID),
            ..Self::default()
        })
    }

    /// Every spawn of the service fails from now on.
    pub fn fail_spawns_of(&self, id: &ServiceId) {
        self.failing.lock().insert(id.clone());
    }

    /// A process that the runner did not spawn but that is alive.
    pub fn adopt(&self, pid: u32) {
        self.foreign.lock().insert(pid);
    }

    /// The adopted process is gone.
    pub fn vanish(&self, pid: u32) {
        self.foreign.lock().remove(&pid);
    }

    /// Makes a live process exit on its own.
    pub fn finish(&self, pid: u32, code: i32) -> bool {
        match self.processes.lock().remove(&pid) {
            Some(process) => process.exit.send(code).is_ok(),
            None => false,
        }
    }

    /// The PIDs spawned for the service, oldest first.
    #[must_use]
    pub fn spawned(&self, id: &ServiceId) -> Vec<u32> {
        self.spawned
            .lock()
            .iter()
            .filter(|(spawned, _)| spawned == id)
            .map(|(_, pid)| *pid)
            .collect()
    }

    /// The number of processes of the service that have not exited.
    #[must_use]
    pub fn live(&self, id: &ServiceId) -> usize {
        self.processes.lock().values().filter(|process| &process.id == id).count()
    }
}

fn immediate_exit(command: &str) -> Option<i32> {
    match command.trim() {
        "true" => Some(0),
        "false" => Some(1),
        command => command.strip_prefix("exit ").and_then(|code| code.trim().parse().ok()),
    }
}

impl Runner for FakeRunner {
    fn spawn<'a>(&'a self, spec: &'a ServiceSpec, journal: Arc<Journal>) -> BoxFuture<'a, Result<Spawned, Error>> {
        async move {
            if self.failing.lock().contains(&spec.id) {
                return Err(Error::Spawn {
                    id: spec.id.clone(),
                    reason: "no such file or directory".to_owned(),
                });
            }

            if let Some(hook) = spec.pre_exec.as_deref().and_then(immediate_exit).filter(|code| *code != 0) {
                return Err(Error::PreExecFailed {
                    id: spec.id.clone(),
                    reason: format!("exited with code {hook}"),
                });
            }

            let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
            self.spawned.lock().push((spec.id.clone(), pid));

            journal.push(Line::new(pid, Stream::Stdout, format!("{} started", spec.id)));

            if let Some(code) = immediate_exit(&spec.command) {
                return Ok(Spawned {
                    pid,
                    wait: WaitHandle(async move { Ok(code) }.boxed()),
                });
            }

            let (tx, rx) = oneshot::channel();

            self.processes.lock().insert(
                pid,
                Process {
                    id: spec.id.clone(),
                    stubborn: spec.command.contains("trap '' TERM"),
                    exit: tx,
                },
            );

            let wait = async move { rx.await.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)) }.boxed();

            Ok(Spawned {
                pid,
                wait: WaitHandle(wait),
            })
        }
        .boxed()
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<(), Error> {
        let mut processes = self.processes.lock();

        let code = match (signal, processes.get(&pid)) {
            (_, None) | (Signal::Terminate, Some(Process { stubborn: true, .. })) => return Ok(()),
            (Signal::Terminate, Some(_)) => 143,
            (Signal::Kill, Some(_)) => 137,
        };

        if let Some(process) = processes.remove(&pid) {
            let _ = process.exit.send(code);
        }

        Ok(())
    }

    fn wait(&self, handle: WaitHandle, _spec: ServiceSpec) -> BoxFuture<'static, Exit> {
        async move {
            match handle.0.await {
                Ok(code) => Exit::code(code),
                Err(e) => Exit::unknown(Some(e.to_string())),
            }
        }
        .boxed()
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.processes.lock().contains_key(&pid) || self.foreign.lock().contains(&pid)
    }
}
