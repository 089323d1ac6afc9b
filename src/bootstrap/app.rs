//! Setup for the main supervisor application.
//!
//! The [`setup`] function builds the [`Supervisor`] from the configuration:
//!
//! 1. Load the configuration from the TOML file and the environment.
//! 2. Initialize the tracing subscriber.
//! 3. Open the store and seed it with the configured services.
//! 4. Load every stored service and reconcile its record with the host.
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use hxe_configuration::{Configuration, Info, DEFAULT_PATH_CONFIG, ENV_VAR_CONFIG_TOML_PATH};
use tracing::instrument;

use crate::core::databases::driver;
use crate::core::runner::OsRunner;
use crate::core::{seed, Supervisor, SUPERVISOR_LOG_TARGET};

/// A host-based process supervisor.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Path to the configuration file.
    #[arg(long, env = ENV_VAR_CONFIG_TOML_PATH, default_value = DEFAULT_PATH_CONFIG)]
    pub config: String,
}

/// It loads the configuration and builds the supervisor.
///
/// # Errors
///
/// Will return an error if the configuration can't be loaded or the store
/// can't be opened.
#[instrument(skip(args))]
pub fn setup(args: &Args) -> anyhow::Result<(Configuration, Arc<Supervisor>)> {
    let info = Info::new(args.config.clone()).context("unable to read the configuration sources")?;
    let configuration = Configuration::load(&info).context("unable to load the configuration")?;

    super::tracing::setup(&configuration.logging);

    let supervisor = initialize_supervisor(&configuration)?;

    Ok((configuration, supervisor))
}

/// Opens the store, seeds it and loads the services.
///
/// # Errors
///
/// Will return an error if the store can't be opened or read.
pub fn initialize_supervisor(configuration: &Configuration) -> anyhow::Result<Arc<Supervisor>> {
    let database = driver::build(&configuration.core.database.driver, &configuration.core.database.path)
        .context("unable to open the store")?;

    let seeded = seed(database.as_ref(), &configuration.seeded_services()).context("unable to seed the store")?;

    if seeded > 0 {
        tracing::info!(target: SUPERVISOR_LOG_TARGET, seeded, "seeded the store from the configuration");
    }

    let supervisor = Supervisor::new(Arc::new(database), Arc::new(OsRunner::new()), &configuration.core);

    let loaded = supervisor.load().context("unable to load the services")?;

    tracing::info!(target: SUPERVISOR_LOG_TARGET, loaded, "services loaded");

    Ok(Arc::new(supervisor))
}
