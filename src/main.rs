use std::sync::Arc;

use clap::Parser as _;
use hxe::app;
use hxe::bootstrap::app::{setup, Args};
use hxe::bus::{Bus, LocalBus};
use hxe::core::SUPERVISOR_LOG_TARGET;
use hxe::servers::gateway::backend::Sessions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (config, supervisor) = setup(&args)?;

    let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());

    let jobs = app::start(&config, supervisor.clone(), bus, Arc::new(Sessions::default())).await?;

    // handle the signals
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(target: SUPERVISOR_LOG_TARGET, "HXE shutting down ...");

            supervisor.shutdown().await;

            // Await for all jobs to shutdown
            futures::future::join_all(jobs).await;

            tracing::info!(target: SUPERVISOR_LOG_TARGET, "HXE successfully shutdown.");
        }
    }

    Ok(())
}
