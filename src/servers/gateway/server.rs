//! Logic to run the Control Protocol Gateway.
//!
//! The gateway subscribes to `<prefix>.service.>` on the bus. Each request
//! runs in its own task, at most `max_in_flight` at once, and is answered
//! within `request_timeout`. A request that times out is answered with a
//! `TIMEOUT` error but its command still completes: the supervisor call runs
//! in a task of its own that the timeout does not cancel.
//!
//! While running, the gateway also republishes every committed change of the
//! supervisor on `<prefix>.event.<id>`.
use std::sync::Arc;

use derive_more::Display;
use futures::FutureExt as _;
use hxe_configuration::Gateway;
use tokio::sync::{broadcast, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::instrument;

use super::backend::ExecutionBackend;
use super::handlers::Handlers;
use super::protocol::{Operation, Response};
use super::GATEWAY_LOG_TARGET;
use crate::bus::{self, Bus, Message, Subscription};
use crate::core::{ErrorCode, ServiceEvent, Supervisor};
use crate::servers::logging::LISTENING_ON;
use crate::servers::signals::{shutdown_signal_with_message, Halted};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unable to subscribe the gateway: {source}")]
    Subscribe { source: bus::Error },

    #[error("the gateway is already stopping")]
    AlreadyStopping,

    #[error("the gateway task failed: {source}")]
    Join { source: tokio::task::JoinError },
}

/// A gateway that is not listening.
#[derive(Debug, Display)]
#[display("Stopped: {}", config.subject_prefix)]
pub struct Stopped {
    pub config: Gateway,
}

/// A gateway listening on the bus.
#[derive(Debug, Display)]
#[display("Running on: {pattern}")]
pub struct Running {
    pub config: Gateway,
    pub pattern: String,
    pub halt_task: Option<oneshot::Sender<Halted>>,
    pub task: JoinHandle<()>,
}

/// The gateway controller.
pub struct GatewayServer<S> {
    pub state: S,
}

impl GatewayServer<Stopped> {
    #[must_use]
    pub fn new(config: Gateway) -> Self {
        Self {
            state: Stopped { config },
        }
    }

    /// Subscribes to the operation subjects and starts answering.
    ///
    /// # Errors
    ///
    /// Will return [`Error::Subscribe`] if the bus refuses the subscription.
    #[instrument(skip(self, supervisor, bus, backend), err)]
    pub fn start(
        self,
        supervisor: Arc<Supervisor>,
        bus: Arc<dyn Bus>,
        backend: Arc<dyn ExecutionBackend>,
    ) -> Result<GatewayServer<Running>, Error> {
        let config = self.state.config;
        let pattern = format!("{}.service.>", config.subject_prefix);

        let requests = bus.subscribe(&pattern).map_err(|source| Error::Subscribe { source })?;
        let events = supervisor.subscribe();

        let handlers = Arc::new(Handlers::new(
            supervisor,
            bus.clone(),
            backend,
            config.subject_prefix.clone(),
        ));

        let (tx_halt, rx_halt) = oneshot::channel::<Halted>();

        let launcher = Launcher {
            handlers,
            bus,
            config: config.clone(),
        };

        let task = tokio::spawn(launcher.run(requests, events, rx_halt));

        tracing::info!(target: GATEWAY_LOG_TARGET, "{LISTENING_ON}: {pattern}");

        Ok(GatewayServer {
            state: Running {
                config,
                pattern,
                halt_task: Some(tx_halt),
                task,
            },
        })
    }
}

impl GatewayServer<Running> {
    /// Stops answering. The requests in flight are dropped.
    ///
    /// # Errors
    ///
    /// Will return an error if the gateway was already told to stop or its
    /// task failed.
    #[instrument(skip(self), err)]
    pub async fn stop(mut self) -> Result<GatewayServer<Stopped>, Error> {
        self.state
            .halt_task
            .take()
            .ok_or(Error::AlreadyStopping)?
            .send(Halted::Normal)
            .map_err(|_| Error::AlreadyStopping)?;

        self.state.task.await.map_err(|source| Error::Join { source })?;

        Ok(GatewayServer {
            state: Stopped {
                config: self.state.config,
            },
        })
    }
}

struct Launcher {
    handlers: Arc<Handlers>,
    bus: Arc<dyn Bus>,
    config: Gateway,
}

impl Launcher {
    async fn run(self, mut requests: Subscription, events: broadcast::Receiver<ServiceEvent>, rx_halt: oneshot::Receiver<Halted>) {
        let in_flight = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let service_prefix = format!("{}.service.", self.config.subject_prefix);

        let republisher = tokio::spawn(republish(events, self.bus.clone(), self.config.subject_prefix.clone()));

        let halted = shutdown_signal_with_message(
            rx_halt,
            format!("Halting the gateway listening on: {}", requests.pattern()),
        )
        .fuse();
        tokio::pin!(halted);

        loop {
            let message = tokio::select! {
                () = &mut halted => break,
                message = requests.next() => message,
            };

            let Some(message) = message else {
                tracing::warn!(target: GATEWAY_LOG_TARGET, "the bus closed the subscription");
                break;
            };

            let Ok(permit) = in_flight.clone().acquire_owned().await else {
                break;
            };

            let operation = message
                .subject
                .strip_prefix(&service_prefix)
                .map(str::parse::<Operation>);

            let handlers = self.handlers.clone();
            let bus = self.bus.clone();
            let timeout = self.config.request_timeout;

            tokio::spawn(async move {
                let response = match operation {
                    Some(Ok(operation)) => answer(handlers, operation, message.payload.clone(), timeout).await,
                    Some(Err(e)) => Response::error(ErrorCode::BadRequest, e.to_string()),
                    None => Response::error(ErrorCode::BadRequest, format!("unexpected subject \"{}\"", message.subject)),
                };

                reply(bus.as_ref(), &message, &response);

                drop(permit);
            });
        }

        republisher.abort();
    }
}

/// Runs one operation under the request timeout.
async fn answer(handlers: Arc<Handlers>, operation: Operation, payload: Vec<u8>, timeout: std::time::Duration) -> Response {
    tracing::debug!(target: GATEWAY_LOG_TARGET, %operation, "request");

    let task = tokio::spawn(async move { handlers.handle(operation, &payload).await });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(target: GATEWAY_LOG_TARGET, %operation, err = %e, "the request handler failed");
            Response::error(ErrorCode::Unavailable, "the request handler failed")
        }
        Err(_) => {
            tracing::warn!(target: GATEWAY_LOG_TARGET, %operation, ?timeout, "request timed out");
            Response::error(
                ErrorCode::Timeout,
                format!("no outcome after {timeout:?}, the command keeps running"),
            )
        }
    }
}

fn reply(bus: &dyn Bus, request: &Message, response: &Response) {
    let payload = match serde_json::to_vec(response) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(target: GATEWAY_LOG_TARGET, err = %e, "unable to encode the response");
            return;
        }
    };

    if let Err(e) = bus.respond(request, payload) {
        tracing::warn!(target: GATEWAY_LOG_TARGET, subject = %request.subject, err = %e, "unable to reply");
    }
}

/// Republishes the committed changes on `<prefix>.event.<id>`.
async fn republish(mut events: broadcast::Receiver<ServiceEvent>, bus: Arc<dyn Bus>, prefix: String) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(target: GATEWAY_LOG_TARGET, skipped, "event republisher lagging");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let subject = format!("{prefix}.event.{}", event.id());

        let response = match event {
            ServiceEvent::Changed(record) => Response::Record { record },
            ServiceEvent::Removed(id) => Response::Ack { id },
        };

        match serde_json::to_vec(&response) {
            Ok(payload) => {
                if let Err(e) = bus.publish(&subject, payload) {
                    tracing::warn!(target: GATEWAY_LOG_TARGET, %subject, err = %e, "unable to republish an event");
                }
            }
            Err(e) => tracing::error!(target: GATEWAY_LOG_TARGET, err = %e, "unable to encode an event"),
        }
    }
}
