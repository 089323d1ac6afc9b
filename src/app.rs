//! Supervisor application.
//!
//! The [`start`] function launches the jobs exposing an already loaded
//! [`Supervisor`]:
//!
//! - The Control Protocol Gateway, on the bus.
//! - The Health Check API, over HTTP.
//!
//! Then it starts the enabled services.
use std::sync::Arc;
use std::time::Duration;

use hxe_configuration::Configuration;
use tokio::task::JoinHandle;

use crate::bootstrap::jobs::{gateway, health_check_api};
use crate::bus::Bus;
use crate::core::Supervisor;
use crate::servers::gateway::backend::ExecutionBackend;
use crate::servers::gateway::client::Client;

/// The health check waits at most this long for the gateway.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// # Errors
///
/// Will return an error if the gateway can't subscribe to the bus.
pub async fn start(
    config: &Configuration,
    supervisor: Arc<Supervisor>,
    bus: Arc<dyn Bus>,
    backend: Arc<dyn ExecutionBackend>,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let mut jobs: Vec<JoinHandle<()>> = Vec::new();

    jobs.push(gateway::start_job(&config.gateway, supervisor.clone(), bus.clone(), backend)?);

    let client = Arc::new(Client::new(
        bus,
        config.gateway.subject_prefix.clone(),
        HEALTH_CHECK_TIMEOUT.min(config.gateway.request_timeout * 2),
    ));

    jobs.push(health_check_api::start_job(&config.health_check_api, client).await);

    supervisor.autostart().await;

    Ok(jobs)
}
