//! Health Check API job starter.
//!
//! The [`start_job`] function spawns a new asynchronous task, the
//! "**launcher**". The launcher starts the actual server and waits for it to
//! finish.
//!
//! The launcher decouples the Health Check API server from the process that
//! handles it.
use std::sync::Arc;

use hxe_configuration::HealthCheckApi;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::instrument;

use super::Started;
use crate::servers::gateway::client::Client;
use crate::servers::health_check_api::{server, HEALTH_CHECK_API_LOG_TARGET};
use crate::servers::logging::STARTED_ON;
use crate::servers::signals::{global_shutdown_signal, Halted};

/// This function starts a new Health Check API server with the provided
/// configuration.
///
/// The functions starts a new concurrent task that will run the API server.
///
/// # Panics
///
/// It would panic if the API server can't be started.
#[instrument(skip(config, client))]
pub async fn start_job(config: &HealthCheckApi, client: Arc<Client>) -> JoinHandle<()> {
    let bind_addr = config.bind_address;

    let (tx_start, rx_start) = oneshot::channel::<Started>();
    let (tx_halt, rx_halt) = oneshot::channel::<Halted>();

    tracing::info!(target: HEALTH_CHECK_API_LOG_TARGET, "Starting on: http://{}", bind_addr);

    let mut tasks = JoinSet::new();

    if let Err(e) = server::start(bind_addr, tx_start, rx_halt, client, &mut tasks) {
        tracing::error!(target: HEALTH_CHECK_API_LOG_TARGET, %e, "failed to start service");
        panic!("failed to start health check api service")
    }

    let local_addr = match rx_start.await {
        Ok(started) => started.local_addr,
        Err(e) => panic!("the Health Check API server was dropped: {e}"),
    };

    tracing::info!(target: HEALTH_CHECK_API_LOG_TARGET, "{STARTED_ON}: http://{local_addr}");

    tokio::spawn(async move {
        global_shutdown_signal().await;

        let _ = tx_halt.send(Halted::Normal);

        while let Some(task) = tasks.join_next().await {
            match task {
                Ok(Ok(())) => (),
                Ok(Err(e)) => tracing::error!(target: HEALTH_CHECK_API_LOG_TARGET, %e, %local_addr, "task flailed with error"),
                Err(e) => tracing::error!(target: HEALTH_CHECK_API_LOG_TARGET, %e, %local_addr, "failed to cleanly join task"),
            }
        }

        tracing::info!(target: HEALTH_CHECK_API_LOG_TARGET, "Stopped server running on: http://{local_addr}");
    })
}
