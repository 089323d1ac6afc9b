//! Logic to run the Health Check HTTP API server.
//!
//! This API is intended to be used by the host infrastructure to check if the
//! supervisor is healthy.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use futures::FutureExt;
use tokio::sync::oneshot::{Receiver, Sender};
use tokio::task::JoinSet;
use tracing::instrument;

use super::routes::router;
use super::HEALTH_CHECK_API_LOG_TARGET;
use crate::bootstrap::jobs::Started;
use crate::servers::gateway::client::Client;
use crate::servers::signals::{graceful_shutdown, Halted};

/// Starts Health Check API server.
///
/// # Errors
///
/// It would return an error if unable to bind socket.
/// It would return an error if unable to get local address.
/// It would return an error if unable to notify the start.
#[instrument(skip(bind_to, tx, rx_halt, client, tasks))]
pub fn start(
    bind_to: SocketAddr,
    tx: Sender<Started>,
    rx_halt: Receiver<Halted>,
    client: Arc<Client>,
    tasks: &mut JoinSet<Result<(), std::io::Error>>,
) -> Result<(), std::io::Error> {
    let socket = std::net::TcpListener::bind(bind_to)?;
    socket.set_nonblocking(true)?;
    let local_addr = socket.local_addr()?;

    let handle = Handle::new();

    tracing::debug!(target: HEALTH_CHECK_API_LOG_TARGET, "Starting service with graceful shutdown in a spawned task ...");

    tasks.spawn(
        graceful_shutdown(
            handle.clone(),
            rx_halt,
            format!("Shutting down health check api on socket address: {local_addr}"),
            Duration::from_secs(10),
        )
        .map(Ok),
    );

    let router = router(client);

    tasks.spawn(
        axum_server::from_tcp(socket)
            .handle(handle)
            .serve(router.into_make_service_with_connect_info::<SocketAddr>()),
    );

    tx.send(Started { local_addr }).map_err(|message| {
        std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            format!("it could not send message: {message:?}"),
        )
    })
}
