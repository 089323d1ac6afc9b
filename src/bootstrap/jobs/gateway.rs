//! Control Protocol Gateway job starter.
//!
//! The [`start_job`] function subscribes the gateway to the bus and returns
//! the task that keeps it running until the global shutdown signal.
use std::sync::Arc;

use hxe_configuration::Gateway;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::bus::Bus;
use crate::core::Supervisor;
use crate::servers::gateway::backend::ExecutionBackend;
use crate::servers::gateway::server::GatewayServer;
use crate::servers::gateway::GATEWAY_LOG_TARGET;
use crate::servers::signals::global_shutdown_signal;

/// It starts a new gateway with the provided configuration.
///
/// # Errors
///
/// Will return an error if the gateway can't subscribe to the bus.
#[instrument(skip(config, supervisor, bus, backend))]
pub fn start_job(
    config: &Gateway,
    supervisor: Arc<Supervisor>,
    bus: Arc<dyn Bus>,
    backend: Arc<dyn ExecutionBackend>,
) -> Result<JoinHandle<()>, crate::servers::gateway::server::Error> {
    let server = GatewayServer::new(config.clone()).start(supervisor, bus, backend)?;

    Ok(tokio::spawn(async move {
        global_shutdown_signal().await;

        if let Err(e) = server.stop().await {
            tracing::error!(target: GATEWAY_LOG_TARGET, err = %e, "failed to stop the gateway");
        }
    }))
}
