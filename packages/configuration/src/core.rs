//! Configuration of the supervisor core: the store, the per-service actors
//! and the retry policy.
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
pub struct Core {
    /// The store for service specs and records.
    #[serde(default)]
    pub database: Database,

    #[serde(default)]
    pub supervisor: Supervisor,

    #[serde(default)]
    pub retry: Retry,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct Database {
    /// Database driver. Possible values are: `sqlite3` and `memory`.
    #[serde(default = "Database::default_driver")]
    pub driver: Driver,

    /// Database connection string. For `sqlite3` it is the path to the
    /// database file. It is ignored by the `memory` driver.
    #[serde(default = "Database::default_path")]
    pub path: String,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            driver: Self::default_driver(),
            path: Self::default_path(),
        }
    }
}

impl Database {
    fn default_driver() -> Driver {
        Driver::Sqlite3
    }

    fn default_path() -> String {
        String::from("./storage/hxe/lib/database/sqlite3.db")
    }
}

/// The database management system used by the supervisor.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// The `Sqlite3` database driver.
    Sqlite3,
    /// A volatile in-process store.
    Memory,
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Driver::Sqlite3 => f.write_str("sqlite3"),
            Driver::Memory => f.write_str("memory"),
        }
    }
}

#[serde_as]
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct Supervisor {
    /// Time given to a service to exit after the termination signal before it
    /// is killed.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "grace_period_ms", default = "Supervisor::default_grace_period")]
    pub grace_period: Duration,

    /// Time given to the operating system to reap a killed service.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "kill_timeout_ms", default = "Supervisor::default_kill_timeout")]
    pub kill_timeout: Duration,

    /// Uninterrupted running time after which the retry count of a service is
    /// reset to zero.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "healthy_after_ms", default = "Supervisor::default_healthy_after")]
    pub healthy_after: Duration,

    /// Polling interval for the liveness of processes adopted at startup.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "liveness_interval_ms", default = "Supervisor::default_liveness_interval")]
    pub liveness_interval: Duration,

    /// Stop every live service when the supervisor shuts down.
    #[serde(default = "Supervisor::default_stop_on_shutdown")]
    pub stop_on_shutdown: bool,

    /// Number of output lines kept per service.
    #[serde(default = "Supervisor::default_log_capacity")]
    pub log_capacity: usize,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self {
            grace_period: Self::default_grace_period(),
            kill_timeout: Self::default_kill_timeout(),
            healthy_after: Self::default_healthy_after(),
            liveness_interval: Self::default_liveness_interval(),
            stop_on_shutdown: Self::default_stop_on_shutdown(),
            log_capacity: Self::default_log_capacity(),
        }
    }
}

impl Supervisor {
    fn default_grace_period() -> Duration {
        Duration::from_secs(5)
    }

    fn default_kill_timeout() -> Duration {
        Duration::from_secs(2)
    }

    fn default_healthy_after() -> Duration {
        Duration::from_secs(30)
    }

    fn default_liveness_interval() -> Duration {
        Duration::from_secs(1)
    }

    fn default_stop_on_shutdown() -> bool {
        true
    }

    fn default_log_capacity() -> usize {
        1000
    }
}

/// The exponential back-off of automatic restarts.
#[serde_as]
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct Retry {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "base_delay_ms", default = "Retry::default_base_delay")]
    pub base_delay: Duration,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "max_delay_ms", default = "Retry::default_max_delay")]
    pub max_delay: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            base_delay: Self::default_base_delay(),
            max_delay: Self::default_max_delay(),
        }
    }
}

impl Retry {
    fn default_base_delay() -> Duration {
        Duration::from_secs(1)
    }

    fn default_max_delay() -> Duration {
        Duration::from_secs(60)
    }
}
