//! Configuration data structures for the HXE process supervisor.
//!
//! This module contains the configuration data structures for the supervisor.
//! The configuration is loaded, in order of precedence, from:
//!
//! 1. The default values of the [`Configuration`] struct.
//! 2. A TOML file, whose path is given by the environment variable
//!    `HXE_CONFIG_TOML_PATH` (`./share/default/config/hxe.toml` by default),
//!    or the whole TOML content, given by the environment variable `HXE_CONFIG_TOML`.
//! 3. Environment variables prefixed with `HXE_CONFIG_OVERRIDE_`, where `__`
//!    separates the nested sections. For example:
//!
//! ```text
//! HXE_CONFIG_OVERRIDE_CORE__DATABASE__DRIVER=memory
//! HXE_CONFIG_OVERRIDE_GATEWAY__REQUEST_TIMEOUT_MS=2500
//! ```
//!
//! A minimal configuration file looks like:
//!
//! ```toml
//! [logging]
//! threshold = "info"
//!
//! [core.database]
//! driver = "sqlite3"
//! path = "./storage/hxe/lib/database/sqlite3.db"
//!
//! [[services]]
//! id = "web"
//! name = "Web server"
//! command = "python3 -m http.server 8080"
//! autostart = true
//! max_retries = 3
//! ```
//!
//! The `[[services]]` tables are seeded into the store at boot if the store
//! does not know the service yet.
pub mod core;
pub mod gateway;
pub mod health_check_api;
pub mod logging;

use std::collections::HashSet;
use std::env;
use std::sync::Arc;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use hxe_located_error::{DynError, LocatedError};
use hxe_primitives::{ServiceId, ServiceSpec, ValidationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::core::{Core, Database, Driver, Retry, Supervisor};
pub use crate::gateway::Gateway;
pub use crate::health_check_api::HealthCheckApi;
pub use crate::logging::{Logging, Threshold, TraceStyle};

/// The whole `hxe.toml` file content. It has priority over the config file.
/// Even if the file is not on the default path.
pub const ENV_VAR_CONFIG_TOML: &str = "HXE_CONFIG_TOML";

/// The `hxe.toml` file location.
pub const ENV_VAR_CONFIG_TOML_PATH: &str = "HXE_CONFIG_TOML_PATH";

/// Prefix for the environment variables that override single values.
pub const CONFIG_OVERRIDE_PREFIX: &str = "HXE_CONFIG_OVERRIDE_";

/// Path separator in the names of the override environment variables.
pub const CONFIG_OVERRIDE_SEPARATOR: &str = "__";

pub const DEFAULT_PATH_CONFIG: &str = "./share/default/config/hxe.toml";

/// Information required for loading config
#[derive(Debug, Default, Clone)]
pub struct Info {
    pub config_toml: Option<String>,
    pub config_toml_path: String,
}

impl Info {
    /// Build configuration Info.
    ///
    /// # Errors
    ///
    /// Will return `Err` if unable to obtain a configuration.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(default_config_toml_path: String) -> Result<Self, Error> {
        let config_toml = if let Ok(config_toml) = env::var(ENV_VAR_CONFIG_TOML) {
            println!("Loading extra configuration from environment variable {ENV_VAR_CONFIG_TOML} ...");
            Some(config_toml)
        } else {
            None
        };

        let config_toml_path = if let Ok(config_toml_path) = env::var(ENV_VAR_CONFIG_TOML_PATH) {
            println!("Loading extra configuration from file: `{config_toml_path}` ...");
            config_toml_path
        } else {
            println!("Loading extra configuration from default configuration file: `{default_config_toml_path}` ...");
            default_config_toml_path
        };

        Ok(Self {
            config_toml,
            config_toml_path,
        })
    }
}

/// Errors that can occur when loading the configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed processing the configuration: {source}")]
    ConfigError {
        source: LocatedError<'static, dyn std::error::Error + Send + Sync>,
    },

    #[error("The configured service \"{id}\" is invalid: {source}")]
    InvalidService { id: ServiceId, source: ValidationError },

    #[error("The service \"{id}\" is configured more than once")]
    DuplicateService { id: ServiceId },
}

impl From<figment::Error> for Error {
    #[track_caller]
    fn from(err: figment::Error) -> Self {
        Self::ConfigError {
            source: (Arc::new(err) as DynError).into(),
        }
    }
}

/// Core configuration for the supervisor.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
pub struct Configuration {
    /// Logging configuration
    #[serde(default)]
    pub logging: Logging,

    /// Supervisor, store and retry policy configuration.
    #[serde(default)]
    pub core: Core,

    /// The control protocol gateway configuration.
    #[serde(default)]
    pub gateway: Gateway,

    /// The Health Check API configuration.
    #[serde(default)]
    pub health_check_api: HealthCheckApi,

    /// Services seeded into the store at boot.
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
}

impl Configuration {
    /// Loads the configuration from the `Info` struct. The whole
    /// configuration in toml format is included in the `info.config_toml` string.
    ///
    /// Configuration provided via env var has priority over config file path.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the environment variable does not exist or has a bad configuration.
    pub fn load(info: &Info) -> Result<Configuration, Error> {
        let figment = if let Some(config_toml) = &info.config_toml {
            // Config in env var has priority over config file path
            Figment::from(Serialized::defaults(Configuration::default()))
                .merge(Toml::string(config_toml))
                .merge(Env::prefixed(CONFIG_OVERRIDE_PREFIX).split(CONFIG_OVERRIDE_SEPARATOR))
        } else {
            Figment::from(Serialized::defaults(Configuration::default()))
                .merge(Toml::file(&info.config_toml_path))
                .merge(Env::prefixed(CONFIG_OVERRIDE_PREFIX).split(CONFIG_OVERRIDE_SEPARATOR))
        };

        let config: Configuration = figment.extract()?;

        config.validate()?;

        Ok(config)
    }

    /// Checks the seeded services and normalizes their optional fields.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a service is invalid or configured twice.
    pub fn validate(&self) -> Result<(), Error> {
        let mut seen = HashSet::new();

        for spec in &self.services {
            spec.validate().map_err(|source| Error::InvalidService {
                id: spec.id.clone(),
                source,
            })?;

            if !seen.insert(&spec.id) {
                return Err(Error::DuplicateService { id: spec.id.clone() });
            }
        }

        Ok(())
    }

    /// The seeded services, with empty optional fields normalized.
    #[must_use]
    pub fn seeded_services(&self) -> Vec<ServiceSpec> {
        self.services.iter().cloned().map(ServiceSpec::normalized).collect()
    }
}
