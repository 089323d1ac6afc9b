//! The handlers of the control protocol operations.
//!
//! A handler decodes the request, calls the [`Supervisor`] and encodes the
//! outcome. `list`, `get` and `status` read the committed snapshots and never
//! wait for a service actor.
use std::sync::Arc;

use hxe_primitives::ServiceSpec;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use super::backend::ExecutionBackend;
use super::protocol::{DeleteRequest, IdRequest, ListRequest, LogFrame, LogRequest, Operation, Response, UpdateRequest};
use super::GATEWAY_LOG_TARGET;
use crate::bus::Bus;
use crate::core::journal::{Entry, Follow};
use crate::core::{ErrorCode, Supervisor};

/// Everything the handlers need.
pub struct Handlers {
    supervisor: Arc<Supervisor>,
    bus: Arc<dyn Bus>,
    backend: Arc<dyn ExecutionBackend>,
    prefix: String,
}

impl Handlers {
    #[must_use]
    pub fn new(supervisor: Arc<Supervisor>, bus: Arc<dyn Bus>, backend: Arc<dyn ExecutionBackend>, prefix: String) -> Self {
        Self {
            supervisor,
            bus,
            backend,
            prefix,
        }
    }

    pub async fn handle(&self, operation: Operation, payload: &[u8]) -> Response {
        match self.route(operation, payload).await {
            Ok(response) | Err(response) => response,
        }
    }

    async fn route(&self, operation: Operation, payload: &[u8]) -> Result<Response, Response> {
        let supervisor = &self.supervisor;

        let response = match operation {
            Operation::List => {
                let ListRequest {} = decode(payload)?;

                Response::Records {
                    records: supervisor.list(),
                }
            }
            Operation::Get | Operation::Status => {
                let IdRequest { id } = decode(payload)?;

                Response::Record {
                    record: supervisor.get(&id)?,
                }
            }
            Operation::Create => {
                let spec: ServiceSpec = decode(payload)?;

                Response::Record {
                    record: supervisor.create(spec)?,
                }
            }
            Operation::Update => {
                let UpdateRequest { id, spec } = decode(payload)?;

                Response::Record {
                    record: supervisor.update(&id, spec).await?,
                }
            }
            Operation::Delete => {
                let DeleteRequest { id, force } = decode(payload)?;
                supervisor.delete(&id, force).await?;

                Response::Ack { id }
            }
            Operation::Start => {
                let IdRequest { id } = decode(payload)?;

                Response::Record {
                    record: supervisor.start(&id).await?,
                }
            }
            Operation::Stop => {
                let IdRequest { id } = decode(payload)?;

                Response::Record {
                    record: supervisor.stop(&id).await?,
                }
            }
            Operation::Restart => {
                let IdRequest { id } = decode(payload)?;

                Response::Record {
                    record: supervisor.restart(&id).await?,
                }
            }
            Operation::Reload => {
                let IdRequest { id } = decode(payload)?;
                supervisor.reload(&id).await?;

                Response::Ack { id }
            }
            Operation::Enable => {
                let IdRequest { id } = decode(payload)?;
                supervisor.enable(&id).await?;

                Response::Ack { id }
            }
            Operation::Disable => {
                let IdRequest { id } = decode(payload)?;
                supervisor.disable(&id).await?;

                Response::Ack { id }
            }
            Operation::Log => self.log(decode(payload)?)?,
            Operation::Shell => {
                let IdRequest { id } = decode(payload)?;
                let spec = supervisor.spec(&id)?;

                let token = self
                    .backend
                    .open_session(&spec)
                    .map_err(|reason| Response::error(ErrorCode::Unavailable, reason))?;

                tracing::info!(target: GATEWAY_LOG_TARGET, %id, "shell session opened");

                Response::Session { token }
            }
        };

        Ok(response)
    }

    /// Returns the buffered tail of the journal and, when asked to follow a
    /// running service, publishes the live lines of its current process.
    ///
    /// The follower is registered before the response goes out. A process
    /// found to have exited in the meantime has nothing left to follow, so
    /// the response carries no subject.
    fn log(&self, request: LogRequest) -> Result<Response, Response> {
        let journal = self.supervisor.journal(&request.id)?;
        let record = self.supervisor.get(&request.id)?;

        let handle = Uuid::new_v4().simple().to_string();
        let lines = journal.tail(request.lines);

        let follower = if request.follow && record.pid != 0 {
            match journal.follow_process(record.pid) {
                Follow::Live(follower) => Some(follower),
                Follow::Exited(code) => {
                    tracing::debug!(target: GATEWAY_LOG_TARGET, id = %request.id, pid = record.pid, code, "nothing to follow");
                    None
                }
            }
        } else {
            None
        };

        let subject = follower.map(|follower| {
            let subject = format!("{}.log.{handle}", self.prefix);

            tokio::spawn(forward(follower, record.pid, self.bus.clone(), subject.clone()));

            subject
        });

        Ok(Response::Stream { handle, subject, lines })
    }
}

/// Publishes the lines of one process until it exits.
async fn forward(mut follower: broadcast::Receiver<Entry>, pid: u32, bus: Arc<dyn Bus>, subject: String) {
    let publish = |frame: &LogFrame| match serde_json::to_vec(frame) {
        Ok(payload) => {
            if let Err(e) = bus.publish(&subject, payload) {
                tracing::warn!(target: GATEWAY_LOG_TARGET, %subject, err = %e, "unable to publish a log frame");
            }
        }
        Err(e) => tracing::error!(target: GATEWAY_LOG_TARGET, err = %e, "unable to encode a log frame"),
    };

    loop {
        match follower.recv().await {
            Ok(Entry::Line(line)) if line.pid == pid => publish(&LogFrame::Line(line)),
            Ok(Entry::Exited { pid: exited, code }) if exited == pid => {
                publish(&LogFrame::End { code });
                break;
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(target: GATEWAY_LOG_TARGET, %subject, skipped, "log follower lagging");
            }
            Err(RecvError::Closed) => break,
        }
    }

    tracing::debug!(target: GATEWAY_LOG_TARGET, %subject, "log stream closed");
}

/// Decodes a request. An empty payload reads as `{}`.
fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, Response> {
    let payload = if payload.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        payload
    };

    serde_json::from_slice(payload).map_err(|e| Response::error(ErrorCode::BadRequest, format!("undecodable request: {e}")))
}
