//! The per-service actor.
//!
//! Every managed service is owned by exactly one [`Actor`], a task that
//! drains a single mailbox. Commands from callers and lifecycle notices
//! (process exits, retry timers, health timers) go through the same mailbox,
//! so they are totally ordered for a service and never race on its record.
//!
//! The actor is the only writer of its [`ServiceRecord`]. Each time the record
//! reaches a consistent state it is committed: copied to the snapshot read by
//! the queries, saved through the [`Database`](crate::core::databases::Database)
//! and broadcast as a [`ServiceEvent`].
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt as _;
use hxe_configuration::Supervisor as Settings;
use hxe_primitives::{ServiceId, ServiceRecord, ServiceSpec, ServiceState, EXIT_CODE_UNKNOWN};
use hxe_services::machine::{self, Command, Event, Plan};
use hxe_services::{Decision, RetryPolicy};
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::databases::{self, Database};
use super::error::Error;
use super::journal::Journal;
use super::runner::{Exit, Runner, Signal, Spawned};
use super::{ServiceEvent, SUPERVISOR_LOG_TARGET};

/// What the actors of a supervisor share.
pub(crate) struct Context {
    pub database: Arc<Box<dyn Database>>,
    pub runner: Arc<dyn Runner>,
    pub policy: RetryPolicy,
    pub settings: Settings,
    pub events: broadcast::Sender<ServiceEvent>,
    pub actors: Weak<DashMap<ServiceId, Handle>>,
}

/// A control command with its payload.
#[derive(Clone, Debug)]
pub enum Instruction {
    Start,
    Stop,
    Restart,
    Enable,
    Disable,
    Reload,
    Update(Box<ServiceSpec>),
    Delete { force: bool },
}

impl Instruction {
    #[must_use]
    pub fn command(&self) -> Command {
        match self {
            Instruction::Start => Command::Start,
            Instruction::Stop => Command::Stop,
            Instruction::Restart => Command::Restart,
            Instruction::Enable => Command::Enable,
            Instruction::Disable => Command::Disable,
            Instruction::Reload => Command::Reload,
            Instruction::Update(_) => Command::Update,
            Instruction::Delete { force } => Command::Delete { force: *force },
        }
    }
}

pub(crate) enum Message {
    Command {
        instruction: Instruction,
        reply: oneshot::Sender<Result<ServiceRecord, Error>>,
    },
    /// The process of the given run has exited.
    Exited { run: u64, exit: Exit },
    RetryDue { token: u64 },
    /// The process of the given run has been running for `healthy_after`.
    Healthy { run: u64 },
    Shutdown { reply: oneshot::Sender<()> },
}

/// The last committed spec and record of a service.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub spec: ServiceSpec,
    pub record: ServiceRecord,
}

/// The way in to an actor.
#[derive(Clone)]
pub(crate) struct Handle {
    pub mailbox: mpsc::UnboundedSender<Message>,
    pub snapshot: Arc<RwLock<Snapshot>>,
    pub journal: Arc<Journal>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Trigger {
    Manual,
    Retry,
}

/// The process of the current run.
struct Live {
    run: u64,
    pid: u32,
    exit: watch::Receiver<Option<Exit>>,
}

#[derive(Default)]
struct Dirty {
    spec: bool,
    record: bool,
}

pub(crate) struct Actor {
    id: ServiceId,
    spec: ServiceSpec,
    record: ServiceRecord,
    dirty: Dirty,
    /// The first storage failure of the message being handled.
    failed_write: Option<databases::error::Error>,
    runs: u64,
    live: Option<Live>,
    retry_tokens: u64,
    pending_retry: Option<u64>,
    removed: bool,
    snapshot: Arc<RwLock<Snapshot>>,
    journal: Arc<Journal>,
    context: Arc<Context>,
    mailbox: mpsc::UnboundedReceiver<Message>,
    me: mpsc::WeakUnboundedSender<Message>,
}

impl Actor {
    pub(crate) fn new(spec: ServiceSpec, record: ServiceRecord, context: Arc<Context>) -> (Self, Handle) {
        let (tx, rx) = mpsc::unbounded_channel();

        let snapshot = Arc::new(RwLock::new(Snapshot {
            spec: spec.clone(),
            record: record.clone(),
        }));

        let journal = Arc::new(Journal::new(context.settings.log_capacity));

        let handle = Handle {
            mailbox: tx.clone(),
            snapshot: snapshot.clone(),
            journal: journal.clone(),
        };

        let actor = Self {
            id: spec.id.clone(),
            spec,
            record,
            dirty: Dirty::default(),
            failed_write: None,
            runs: 0,
            live: None,
            retry_tokens: 0,
            pending_retry: None,
            removed: false,
            snapshot,
            journal,
            context,
            mailbox: rx,
            me: tx.downgrade(),
        };

        (actor, handle)
    }

    /// Resolves a record recovered from the store whose process may or may
    /// not have survived the previous supervisor.
    pub(crate) fn reconcile(&mut self) -> Result<(), Error> {
        if self.record.state.has_process() {
            let orphan = self.record.pid;

            self.step(Event::Orphaned)?;
            self.record.pid = 0;
            self.commit();

            let alive = orphan != 0 && self.context.runner.is_alive(orphan);
            self.reconciled(orphan, alive)?;
        } else if self.record.state == ServiceState::Unknown {
            self.reconciled(0, false)?;
        }

        self.flush_failed_write();

        Ok(())
    }

    fn reconciled(&mut self, pid: u32, alive: bool) -> Result<(), Error> {
        if alive {
            self.step(Event::Alive)?;
            self.record.pid = pid;

            tracing::info!(target: SUPERVISOR_LOG_TARGET, id = %self.id, pid, "adopted a process that outlived the previous supervisor");

            self.adopt(pid);
        } else {
            self.step(Event::Dead)?;
            self.record.exit_code = EXIT_CODE_UNKNOWN;
            self.record.ended_at = Some(Utc::now());

            tracing::info!(target: SUPERVISOR_LOG_TARGET, id = %self.id, pid, "the recovered process is gone");
        }

        self.commit();

        Ok(())
    }

    pub(crate) async fn run(mut self) {
        tracing::debug!(target: SUPERVISOR_LOG_TARGET, id = %self.id, state = %self.record.state, "actor started");

        while let Some(message) = self.mailbox.recv().await {
            match message {
                Message::Command { instruction, reply } => {
                    let result = self.execute(instruction).await;
                    let _ = reply.send(result);
                }
                Message::Exited { run, exit } => self.on_exit(run, exit),
                Message::RetryDue { token } => self.on_retry_due(token).await,
                Message::Healthy { run } => self.on_healthy(run),
                Message::Shutdown { reply } => {
                    self.on_shutdown().await;
                    let _ = reply.send(());
                }
            }

            if self.removed {
                break;
            }
        }

        tracing::debug!(target: SUPERVISOR_LOG_TARGET, id = %self.id, "actor stopped");
    }

    async fn execute(&mut self, instruction: Instruction) -> Result<ServiceRecord, Error> {
        let command = instruction.command();

        let plan = machine::on_command(&self.record, &self.spec, command).map_err(|refusal| Error::Refused {
            id: self.id.clone(),
            refusal,
        })?;

        tracing::info!(target: SUPERVISOR_LOG_TARGET, id = %self.id, %command, ?plan, "command accepted");

        let outcome = self.carry_out(plan, instruction).await;

        match (outcome, self.failed_write.take()) {
            (Err(e), _) => Err(e),
            (Ok(()), Some(source)) => Err(Error::Storage {
                id: self.id.clone(),
                source,
            }),
            (Ok(()), None) => Ok(self.record.clone()),
        }
    }

    async fn carry_out(&mut self, plan: Plan, instruction: Instruction) -> Result<(), Error> {
        match plan {
            Plan::Launch => self.launch(Trigger::Manual).await,
            Plan::Unchanged => Ok(()),
            Plan::Halt => self.halt().await,
            Plan::Cycle => {
                self.halt().await?;
                self.launch(Trigger::Manual).await
            }
            Plan::Enable => {
                self.set_enabled(true);

                if self.record.state == ServiceState::Failed {
                    self.record.retry_count = 0;
                    self.commit();
                }

                Ok(())
            }
            Plan::Disable => {
                self.set_enabled(false);
                Ok(())
            }
            Plan::Refresh => match instruction {
                Instruction::Update(spec) => {
                    self.replace_spec(*spec);
                    Ok(())
                }
                _ => self.reload(),
            },
            Plan::Remove => self.remove(),
            Plan::HaltThenRemove => {
                self.halt().await?;
                self.remove()
            }
        }
    }

    /// Moves the record along an internal event. The caller commits once the
    /// record is consistent again.
    fn step(&mut self, event: Event) -> Result<(), Error> {
        let next = machine::on_event(self.record.state, event).map_err(|source| Error::Unexpected {
            id: self.id.clone(),
            source,
        })?;

        tracing::debug!(target: SUPERVISOR_LOG_TARGET, id = %self.id, from = %self.record.state, to = %next, %event, "transition");

        self.record.state = next;

        Ok(())
    }

    fn commit(&mut self) {
        debug_assert!(self.record.is_consistent(), "committing an inconsistent record: {:?}", self.record);

        self.snapshot.write().record = self.record.clone();
        self.dirty.record = true;
        self.persist();

        let _ = self.context.events.send(ServiceEvent::Changed(self.record.clone()));
    }

    /// Writes whatever the store is missing. A failed write stays dirty and
    /// is written again by the next persist.
    fn persist(&mut self) {
        if self.dirty.spec {
            match self.context.database.save_spec(&self.spec) {
                Ok(()) => self.dirty.spec = false,
                Err(e) => return self.write_failed(e),
            }
        }

        if self.dirty.record {
            match self.context.database.save_record(&self.record) {
                Ok(()) => self.dirty.record = false,
                Err(e) => self.write_failed(e),
            }
        }
    }

    fn write_failed(&mut self, e: databases::error::Error) {
        tracing::error!(target: SUPERVISOR_LOG_TARGET, id = %self.id, err = %e, "unable to persist the service");

        if self.failed_write.is_none() {
            self.failed_write = Some(e);
        }
    }

    /// Drops the storage failure of a message that has no caller to report to.
    fn flush_failed_write(&mut self) {
        self.failed_write = None;
    }

    async fn launch(&mut self, trigger: Trigger) -> Result<(), Error> {
        self.cancel_retry();

        if trigger == Trigger::Manual {
            self.record.retry_count = 0;
            self.record.last_error = None;
        }

        self.step(Event::Launch)?;

        let spec = self.spec.clone();

        match self.context.runner.spawn(&spec, self.journal.clone()).await {
            Ok(spawned) => {
                self.record.pid = spawned.pid;
                self.record.exit_code = 0;
                self.record.started_at = Some(Utc::now());
                self.record.ended_at = None;
                self.commit();

                self.watch(spawned);

                self.step(Event::Spawned)?;
                self.commit();

                Ok(())
            }
            Err(e) => {
                tracing::warn!(target: SUPERVISOR_LOG_TARGET, id = %self.id, err = %e, ?trigger, "launch failed");

                self.record.last_error = Some(e.to_string());
                self.record.ended_at = Some(Utc::now());

                match trigger {
                    Trigger::Manual => {
                        self.step(Event::SpawnFailed)?;
                        self.record.pid = 0;
                        self.commit();

                        Err(e.into())
                    }
                    Trigger::Retry => {
                        self.step(Event::Relapse)?;
                        self.after_failure()
                    }
                }
            }
        }
    }

    /// Follows a process spawned by the runner.
    fn watch(&mut self, spawned: Spawned) {
        let exited = self.context.runner.wait(spawned.wait, self.spec.clone());
        self.track(spawned.pid, exited);
    }

    /// Follows a process recovered from the previous supervisor. It is not
    /// our child, so its exit code is never known.
    fn adopt(&mut self, pid: u32) {
        let runner = self.context.runner.clone();
        let liveness_interval = self.context.settings.liveness_interval;

        let exited = async move {
            let mut ticker = tokio::time::interval(liveness_interval);

            loop {
                ticker.tick().await;

                if !runner.is_alive(pid) {
                    return Exit::unknown(None);
                }
            }
        }
        .boxed();

        self.track(pid, exited);
    }

    fn track(&mut self, pid: u32, exited: BoxFuture<'static, Exit>) {
        self.runs += 1;
        let run = self.runs;

        let (tx, rx) = watch::channel(None);
        let journal = self.journal.clone();
        let me = self.me.clone();

        tokio::spawn(async move {
            let exit = exited.await;

            journal.exited(pid, exit.code);
            tx.send_replace(Some(exit.clone()));

            if let Some(mailbox) = me.upgrade() {
                let _ = mailbox.send(Message::Exited { run, exit });
            }
        });

        let me = self.me.clone();
        let healthy_after = self.context.settings.healthy_after;

        tokio::spawn(async move {
            tokio::time::sleep(healthy_after).await;

            if let Some(mailbox) = me.upgrade() {
                let _ = mailbox.send(Message::Healthy { run });
            }
        });

        self.live = Some(Live { run, pid, exit: rx });
    }

    /// Stops the live process, or cancels the pending retry when there is
    /// none. The record ends `Stopped`.
    async fn halt(&mut self) -> Result<(), Error> {
        let Some(live) = self.live.take() else {
            self.cancel_retry();
            self.step(Event::Cancelled)?;
            self.record.pid = 0;
            self.commit();

            return Ok(());
        };

        self.step(Event::Halt)?;
        self.commit();

        let exit = self.terminate(live).await;

        self.step(Event::Halted)?;
        self.record.pid = 0;
        self.record.exit_code = exit.code;
        self.record.ended_at = Some(Utc::now());

        if let Some(error) = exit.error {
            self.record.last_error = Some(error);
        }

        self.commit();

        Ok(())
    }

    /// Asks the process to exit, then kills it after the grace period.
    async fn terminate(&self, live: Live) -> Exit {
        let Live { pid, mut exit, .. } = live;

        let escalation = [
            (Signal::Terminate, self.context.settings.grace_period),
            (Signal::Kill, self.context.settings.kill_timeout),
        ];

        for (signal, patience) in escalation {
            tracing::debug!(target: SUPERVISOR_LOG_TARGET, id = %self.id, pid, %signal, "signalling");

            if let Err(e) = self.context.runner.signal(pid, signal) {
                tracing::warn!(target: SUPERVISOR_LOG_TARGET, id = %self.id, pid, %signal, err = %e, "unable to signal the process");
            }

            match tokio::time::timeout(patience, exit.wait_for(Option::is_some)).await {
                Ok(Ok(seen)) => {
                    if let Some(exit) = seen.clone() {
                        return exit;
                    }
                }
                Ok(Err(_)) => return Exit::unknown(Some("the process watcher is gone".to_owned())),
                Err(_) => {
                    tracing::warn!(target: SUPERVISOR_LOG_TARGET, id = %self.id, pid, %signal, ?patience, "the process is still alive");
                }
            }
        }

        tracing::error!(target: SUPERVISOR_LOG_TARGET, id = %self.id, pid, "the process survived SIGKILL");

        Exit::unknown(Some("the process did not exit after SIGKILL".to_owned()))
    }

    fn on_exit(&mut self, run: u64, exit: Exit) {
        if self.live.as_ref().map(|live| live.run) != Some(run) {
            tracing::trace!(target: SUPERVISOR_LOG_TARGET, id = %self.id, run, "exit of a past run");
            return;
        }

        self.live = None;

        tracing::info!(target: SUPERVISOR_LOG_TARGET, id = %self.id, code = exit.code, "process exited");

        self.record.exit_code = exit.code;
        self.record.ended_at = Some(Utc::now());

        let outcome = if exit.code == 0 {
            let event = if self.spec.oneshot { Event::Completed } else { Event::Finished };

            self.step(event).map(|()| {
                self.record.pid = 0;
                self.commit();
            })
        } else {
            self.record.last_error = Some(exit.error.unwrap_or_else(|| format!("exited with code {}", exit.code)));

            self.step(Event::Crashed).and_then(|()| self.after_failure())
        };

        if let Err(e) = outcome {
            tracing::error!(target: SUPERVISOR_LOG_TARGET, id = %self.id, err = %e, "unable to handle the exit");
        }

        self.flush_failed_write();
    }

    /// Asks the retry policy what follows a failure. The record is
    /// `Stopping` and still carries the PID of the failed run.
    fn after_failure(&mut self) -> Result<(), Error> {
        let decision = if self.spec.enabled {
            self.context.policy.decide(&self.record, &self.spec)
        } else {
            Decision::GiveUp
        };

        match decision {
            Decision::GiveUp => {
                self.step(Event::Exhausted)?;
                self.record.pid = 0;

                tracing::warn!(target: SUPERVISOR_LOG_TARGET, id = %self.id, retries = self.record.retry_count, enabled = self.spec.enabled, "giving up");
            }
            Decision::RestartNow | Decision::RestartAfter(_) => {
                let delay = match decision {
                    Decision::RestartAfter(delay) => delay,
                    _ => Duration::ZERO,
                };

                self.step(Event::Backoff)?;
                self.record.retry_count += 1;

                tracing::info!(target: SUPERVISOR_LOG_TARGET, id = %self.id, retry = self.record.retry_count, ?delay, "restart scheduled");

                self.schedule_retry(delay);
            }
        }

        self.commit();

        Ok(())
    }

    fn schedule_retry(&mut self, delay: Duration) {
        self.retry_tokens += 1;
        let token = self.retry_tokens;
        self.pending_retry = Some(token);

        let me = self.me.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if let Some(mailbox) = me.upgrade() {
                let _ = mailbox.send(Message::RetryDue { token });
            }
        });
    }

    fn cancel_retry(&mut self) {
        self.pending_retry = None;
    }

    async fn on_retry_due(&mut self, token: u64) {
        if self.pending_retry != Some(token) || self.record.state != ServiceState::Restarting {
            return;
        }

        self.pending_retry = None;

        if let Err(e) = self.launch(Trigger::Retry).await {
            tracing::error!(target: SUPERVISOR_LOG_TARGET, id = %self.id, err = %e, "unable to restart");
        }

        self.flush_failed_write();
    }

    fn on_healthy(&mut self, run: u64) {
        let current = self.live.as_ref().is_some_and(|live| live.run == run);

        if current && self.record.state == ServiceState::Running && self.record.retry_count != 0 {
            tracing::debug!(target: SUPERVISOR_LOG_TARGET, id = %self.id, "healthy again, retries reset");

            self.record.retry_count = 0;
            self.commit();
            self.flush_failed_write();
        }
    }

    async fn on_shutdown(&mut self) {
        if self.live.is_some() || self.pending_retry.is_some() {
            if let Err(e) = self.halt().await {
                tracing::error!(target: SUPERVISOR_LOG_TARGET, id = %self.id, err = %e, "unable to stop on shutdown");
            }
        }

        self.flush_failed_write();
    }

    fn set_enabled(&mut self, enabled: bool) {
        if self.spec.enabled != enabled {
            self.spec.enabled = enabled;
            self.publish_spec();
        }
    }

    fn replace_spec(&mut self, spec: ServiceSpec) {
        self.spec = spec;
        self.publish_spec();
    }

    fn publish_spec(&mut self) {
        self.snapshot.write().spec = self.spec.clone();
        self.dirty.spec = true;
        self.persist();
    }

    /// Re-reads the spec from the store. The running process keeps the spec
    /// it was launched with.
    fn reload(&mut self) -> Result<(), Error> {
        self.persist();

        let stored = self.context.database.load_spec(&self.id).map_err(|source| Error::Storage {
            id: self.id.clone(),
            source,
        })?;

        let spec = stored.ok_or_else(|| Error::NotFound { id: self.id.clone() })?;

        if !self.dirty.spec {
            self.spec = spec;
            self.snapshot.write().spec = self.spec.clone();
        }

        Ok(())
    }

    fn remove(&mut self) -> Result<(), Error> {
        self.context.database.remove_service(&self.id).map_err(|source| Error::Storage {
            id: self.id.clone(),
            source,
        })?;

        self.cancel_retry();
        self.removed = true;

        if let Some(actors) = self.context.actors.upgrade() {
            actors.remove(&self.id);
        }

        tracing::info!(target: SUPERVISOR_LOG_TARGET, id = %self.id, "service removed");

        let _ = self.context.events.send(ServiceEvent::Removed(self.id.clone()));

        Ok(())
    }
}
