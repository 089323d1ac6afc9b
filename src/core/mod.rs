//! The core `supervisor` module contains the generic process supervisor logic which is independent of the delivery layer.
//!
//! It contains the supervisor services and their dependencies. It's a domain layer which does not
//! specify how the end user should connect to the supervisor.
//!
//! Typically this module is intended to be used by higher modules like:
//!
//! - A control protocol gateway on a message bus
//! - A health check HTTP API
//!
//! ```text
//! Delivery layer     Domain layer
//!
//!   Gateway     |
//!  Health API   |>  Core supervisor
//! ```
//!
//! # Table of contents
//!
//! - [Supervisor](#supervisor)
//! - [Actors](#actors)
//! - [Reconciliation](#reconciliation)
//! - [Persistence](#persistence)
//!
//! # Supervisor
//!
//! The [`Supervisor`] is the main struct in this module. It owns one actor per
//! managed service and is the only way to change a service:
//!
//! ```text
//! let supervisor = Supervisor::new(database, runner, &config.core);
//!
//! supervisor.load()?;
//! let record = supervisor.start(&id).await?;
//! ```
//!
//! The queries ([`Supervisor::get`], [`Supervisor::list`]) read the last
//! committed snapshot and never wait for an actor.
//!
//! # Actors
//!
//! Each actor serializes the commands and the lifecycle notices of one
//! service. Commands for different services run fully in parallel.
//!
//! Commands are checked against the Service State Machine
//! ([`hxe_services::on_command`]) before anything happens. A refused command
//! is answered right away and never queued.
//!
//! # Reconciliation
//!
//! [`Supervisor::load`] runs once at startup, before any command is accepted.
//! Every record stored with a process (`starting`, `running`, `stopping` or
//! `restarting`) is first marked `unknown`, then checked: a process that is
//! still alive is adopted and the record goes back to `running`, otherwise the
//! record becomes `stopped` with an unknown exit code.
//!
//! # Persistence
//!
//! Every committed record is saved through the [`Database`] trait. A failed
//! write does not stop the actor: the record stays as observed, the caller of
//! the command gets a [`Error::Storage`], and the next commit of the same
//! service writes it again.
pub mod actor;
pub mod databases;
pub mod error;
pub mod journal;
pub mod runner;

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use hxe_configuration::Core;
use hxe_primitives::{ServiceId, ServiceRecord, ServiceSpec, ServiceState, ValidationError};
use hxe_services::RetryPolicy;
use tokio::sync::{broadcast, oneshot};
use tracing::instrument;

pub use self::actor::{Instruction, Snapshot};
use self::actor::{Actor, Context, Handle, Message};
use self::databases::Database;
pub use self::error::{Error, ErrorCode};
use self::journal::Journal;
use self::runner::Runner;

pub const SUPERVISOR_LOG_TARGET: &str = "SUPERVISOR";

const EVENTS_CAPACITY: usize = 1024;

/// A committed change, as broadcast to the subscribers of the supervisor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceEvent {
    Changed(ServiceRecord),
    Removed(ServiceId),
}

impl ServiceEvent {
    #[must_use]
    pub fn id(&self) -> &ServiceId {
        match self {
            ServiceEvent::Changed(record) => &record.id,
            ServiceEvent::Removed(id) => id,
        }
    }
}

/// Writes the configured specs that the store does not know yet, each with a
/// `ready` record. Stored specs win over the configuration.
///
/// # Errors
///
/// Will return a database error if the store cannot be read or written.
pub fn seed(database: &dyn Database, specs: &[ServiceSpec]) -> Result<usize, databases::error::Error> {
    let mut seeded = 0;

    for spec in specs {
        if database.is_service_stored(&spec.id)? {
            continue;
        }

        database.save_spec(spec)?;
        database.save_record(&ServiceRecord::ready(spec.id.clone()))?;

        tracing::info!(target: SUPERVISOR_LOG_TARGET, id = %spec.id, "seeded from the configuration");

        seeded += 1;
    }

    Ok(seeded)
}

/// The process supervisor.
pub struct Supervisor {
    actors: Arc<DashMap<ServiceId, Handle>>,
    context: Arc<Context>,
}

impl Supervisor {
    #[must_use]
    pub fn new(database: Arc<Box<dyn Database>>, runner: Arc<dyn Runner>, config: &Core) -> Self {
        let actors = Arc::new(DashMap::new());
        let (events, _) = broadcast::channel(EVENTS_CAPACITY);

        let context = Arc::new(Context {
            database,
            runner,
            policy: RetryPolicy::new(config.retry.base_delay, config.retry.max_delay),
            settings: config.supervisor.clone(),
            events,
            actors: Arc::downgrade(&actors),
        });

        Self { actors, context }
    }

    /// Loads the stored services, reconciles the records recovered with a
    /// process and starts one actor per service.
    ///
    /// # Errors
    ///
    /// Will return [`Error::Load`] if the store cannot be read.
    ///
    /// # Panics
    ///
    /// It panics when called outside of a Tokio runtime.
    #[instrument(skip(self), err)]
    pub fn load(&self) -> Result<usize, Error> {
        let stored = self
            .context
            .database
            .load_services()
            .map_err(|source| Error::Load { source })?;

        let mut loaded = 0;

        for (spec, record) in stored {
            let record = record.unwrap_or_else(|| ServiceRecord::ready(spec.id.clone()));
            let id = spec.id.clone();

            let Entry::Vacant(entry) = self.actors.entry(id.clone()) else {
                continue;
            };

            let (mut actor, handle) = Actor::new(spec, record, self.context.clone());

            if let Err(e) = actor.reconcile() {
                tracing::error!(target: SUPERVISOR_LOG_TARGET, %id, err = %e, "unable to reconcile the stored record");
            }

            entry.insert(handle);
            tokio::spawn(actor.run());

            loaded += 1;
        }

        tracing::info!(target: SUPERVISOR_LOG_TARGET, loaded, "services loaded");

        Ok(loaded)
    }

    /// Registers a new service, `ready` and not started.
    ///
    /// # Errors
    ///
    /// Will return [`Error::Validation`] for a malformed spec,
    /// [`Error::AlreadyExists`] if the id is taken, or [`Error::Storage`] if
    /// the service cannot be saved.
    #[instrument(skip(self, spec), fields(id = %spec.id), err)]
    pub fn create(&self, spec: ServiceSpec) -> Result<ServiceRecord, Error> {
        let spec = spec.normalized();
        spec.validate()?;

        let entry = match self.actors.entry(spec.id.clone()) {
            Entry::Occupied(_) => return Err(Error::AlreadyExists { id: spec.id }),
            Entry::Vacant(entry) => entry,
        };

        let record = ServiceRecord::ready(spec.id.clone());

        self.context
            .database
            .save_spec(&spec)
            .and_then(|()| self.context.database.save_record(&record))
            .map_err(|source| Error::Storage {
                id: spec.id.clone(),
                source,
            })?;

        let (actor, handle) = Actor::new(spec, record.clone(), self.context.clone());

        entry.insert(handle);
        tokio::spawn(actor.run());

        let _ = self.context.events.send(ServiceEvent::Changed(record.clone()));

        Ok(record)
    }

    /// Queues a command behind the ones already sent to the service and waits
    /// for its outcome.
    ///
    /// # Errors
    ///
    /// Will return [`Error::NotFound`] for an unknown service, the refusal of
    /// the state machine, or the failure of the command.
    pub async fn dispatch(&self, id: &ServiceId, instruction: Instruction) -> Result<ServiceRecord, Error> {
        let mailbox = self.handle(id)?.mailbox;
        let (reply, rx) = oneshot::channel();

        mailbox
            .send(Message::Command { instruction, reply })
            .map_err(|_| Error::Unavailable { id: id.clone() })?;

        rx.await.map_err(|_| Error::Unavailable { id: id.clone() })?
    }

    /// # Errors
    ///
    /// See [`Supervisor::dispatch`].
    #[instrument(skip(self), err)]
    pub async fn start(&self, id: &ServiceId) -> Result<ServiceRecord, Error> {
        self.dispatch(id, Instruction::Start).await
    }

    /// # Errors
    ///
    /// See [`Supervisor::dispatch`].
    #[instrument(skip(self), err)]
    pub async fn stop(&self, id: &ServiceId) -> Result<ServiceRecord, Error> {
        self.dispatch(id, Instruction::Stop).await
    }

    /// # Errors
    ///
    /// See [`Supervisor::dispatch`].
    #[instrument(skip(self), err)]
    pub async fn restart(&self, id: &ServiceId) -> Result<ServiceRecord, Error> {
        self.dispatch(id, Instruction::Restart).await
    }

    /// # Errors
    ///
    /// See [`Supervisor::dispatch`].
    #[instrument(skip(self), err)]
    pub async fn enable(&self, id: &ServiceId) -> Result<(), Error> {
        self.dispatch(id, Instruction::Enable).await.map(|_| ())
    }

    /// # Errors
    ///
    /// See [`Supervisor::dispatch`].
    #[instrument(skip(self), err)]
    pub async fn disable(&self, id: &ServiceId) -> Result<(), Error> {
        self.dispatch(id, Instruction::Disable).await.map(|_| ())
    }

    /// Re-reads the spec from the store. It takes effect on the next launch.
    ///
    /// # Errors
    ///
    /// See [`Supervisor::dispatch`].
    #[instrument(skip(self), err)]
    pub async fn reload(&self, id: &ServiceId) -> Result<(), Error> {
        self.dispatch(id, Instruction::Reload).await.map(|_| ())
    }

    /// Replaces the spec of a service. It takes effect on the next launch.
    ///
    /// # Errors
    ///
    /// Will return [`Error::Validation`] if the spec is malformed or names
    /// another service, otherwise see [`Supervisor::dispatch`].
    #[instrument(skip(self, spec), err)]
    pub async fn update(&self, id: &ServiceId, spec: ServiceSpec) -> Result<ServiceRecord, Error> {
        let spec = spec.normalized();
        spec.validate()?;

        if &spec.id != id {
            return Err(ValidationError::MismatchedId {
                expected: id.clone(),
                found: spec.id,
            }
            .into());
        }

        self.dispatch(id, Instruction::Update(Box::new(spec))).await
    }

    /// Removes a service. A running service is only removed with `force`, and
    /// then it is stopped first.
    ///
    /// # Errors
    ///
    /// See [`Supervisor::dispatch`].
    #[instrument(skip(self), err)]
    pub async fn delete(&self, id: &ServiceId, force: bool) -> Result<(), Error> {
        self.dispatch(id, Instruction::Delete { force }).await.map(|_| ())
    }

    /// The last committed record of a service.
    ///
    /// # Errors
    ///
    /// Will return [`Error::NotFound`] for an unknown service.
    pub fn get(&self, id: &ServiceId) -> Result<ServiceRecord, Error> {
        Ok(self.snapshot(id)?.record)
    }

    /// # Errors
    ///
    /// Will return [`Error::NotFound`] for an unknown service.
    pub fn spec(&self, id: &ServiceId) -> Result<ServiceSpec, Error> {
        Ok(self.snapshot(id)?.spec)
    }

    /// # Errors
    ///
    /// Will return [`Error::NotFound`] for an unknown service.
    pub fn snapshot(&self, id: &ServiceId) -> Result<Snapshot, Error> {
        Ok(self.handle(id)?.snapshot.read().clone())
    }

    /// The last committed records, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<ServiceRecord> {
        let mut records: Vec<ServiceRecord> = self
            .actors
            .iter()
            .map(|handle| handle.snapshot.read().record.clone())
            .collect();

        records.sort_by(|a, b| a.id.cmp(&b.id));

        records
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.context.events.subscribe()
    }

    /// The output journal of a service.
    ///
    /// # Errors
    ///
    /// Will return [`Error::NotFound`] for an unknown service.
    pub fn journal(&self, id: &ServiceId) -> Result<Arc<Journal>, Error> {
        Ok(self.handle(id)?.journal)
    }

    /// Starts every enabled autostart service that is not running.
    #[instrument(skip(self))]
    pub async fn autostart(&self) {
        let ids: Vec<ServiceId> = self
            .actors
            .iter()
            .filter(|handle| {
                let snapshot = handle.snapshot.read();

                snapshot.spec.enabled
                    && snapshot.spec.autostart
                    && matches!(snapshot.record.state, ServiceState::Ready | ServiceState::Stopped)
            })
            .map(|handle| handle.key().clone())
            .collect();

        let started = join_all(ids.iter().map(|id| self.start(id))).await;

        for (id, result) in ids.iter().zip(started) {
            match result {
                Ok(record) => tracing::info!(target: SUPERVISOR_LOG_TARGET, %id, pid = record.pid, "autostarted"),
                Err(e) => tracing::warn!(target: SUPERVISOR_LOG_TARGET, %id, err = %e, "unable to autostart"),
            }
        }
    }

    /// Stops every live process when the configuration asks for it.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        if !self.context.settings.stop_on_shutdown {
            tracing::info!(target: SUPERVISOR_LOG_TARGET, "leaving the services running");
            return;
        }

        let mailboxes: Vec<_> = self.actors.iter().map(|handle| handle.mailbox.clone()).collect();

        let stopped = mailboxes.into_iter().map(|mailbox| async move {
            let (reply, rx) = oneshot::channel();

            if mailbox.send(Message::Shutdown { reply }).is_ok() {
                let _ = rx.await;
            }
        });

        join_all(stopped).await;

        tracing::info!(target: SUPERVISOR_LOG_TARGET, "all services stopped");
    }

    fn handle(&self, id: &ServiceId) -> Result<Handle, Error> {
        self.actors
            .get(id)
            .map(|handle| handle.clone())
            .ok_or_else(|| Error::NotFound { id: id.clone() })
    }
}
