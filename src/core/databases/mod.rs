//! The persistence module.
//!
//! Persistence is currently implemented with one [`Database`] trait.
//!
//! There are two implementations of the trait (two drivers):
//!
//! - [`Sqlite`](crate::core::databases::sqlite::Sqlite)
//! - [`Memory`](crate::core::databases::memory::Memory)
//!
//! > **NOTICE**: There are no database migrations. If there are any changes,
//! > we will implemented them or will provide a script to migrate to the new schema.
//!
//! The persistent objects are:
//!
//! - [Service specs](#service-specs)
//! - [Service records](#service-records)
//!
//! # Service specs
//!
//! The launch definition of every managed service, keyed by service id.
//!
//! Field        | Sample data          | Description
//! ---|---|---
//! `id`         | `web`                | The service id
//! `definition` | `{"id":"web",...}`   | The whole spec, as JSON
//!
//! # Service records
//!
//! The last observed runtime record of every service. Each row references the
//! spec of the same id and is removed with it.
//!
//! Field         | Sample data     | Description
//! ---|---|---
//! `id`          | `web`           | The service id
//! `state`       | `running`       | The lifecycle state
//! `pid`         | `4242`          | The process id, `0` without a process
//! `exit_code`   | `0`             | The last exit code, `-1` if unknown
//! `started_at`  | `1700000000000` | Unix time in milliseconds
//! `ended_at`    | `NULL`          | Unix time in milliseconds
//! `retry_count` | `0`             | Automatic restarts since the last manual start
//! `last_error`  | `NULL`          | The last failure
//!
//! Each actor of the supervisor only writes the rows of its own service, so a
//! per-row upsert is the only atomicity the drivers provide.
pub mod driver;
pub mod error;
pub mod memory;
pub mod sqlite;

use hxe_primitives::{ServiceId, ServiceRecord, ServiceSpec};
#[cfg(test)]
use mockall::automock;

use self::error::Error;

/// A stored service: its spec, and its record unless it was never saved.
pub type StoredService = (ServiceSpec, Option<ServiceRecord>);

/// The persistence trait. It contains all the methods to interact with the database.
#[cfg_attr(test, automock)]
pub trait Database: Sync + Send {
    /// It generates the database tables. SQL queries are hardcoded in the trait
    /// implementation.
    ///
    /// # Context: Schema
    ///
    /// # Errors
    ///
    /// Will return `Error` if unable to create own tables.
    fn create_database_tables(&self) -> Result<(), Error>;

    /// It drops the database tables.
    ///
    /// # Context: Schema
    ///
    /// # Errors
    ///
    /// Will return `Err` if unable to drop tables.
    fn drop_database_tables(&self) -> Result<(), Error>;

    /// It loads every stored service, ordered by id.
    ///
    /// # Context: Services
    ///
    /// # Errors
    ///
    /// Will return `Err` if unable to load.
    fn load_services(&self) -> Result<Vec<StoredService>, Error>;

    /// It loads the spec of one service.
    ///
    /// # Context: Services
    ///
    /// # Errors
    ///
    /// Will return `Err` if unable to load.
    fn load_spec(&self, id: &ServiceId) -> Result<Option<ServiceSpec>, Error>;

    /// It inserts or replaces the spec of a service.
    ///
    /// # Context: Services
    ///
    /// # Errors
    ///
    /// Will return `Err` if unable to save.
    fn save_spec(&self, spec: &ServiceSpec) -> Result<(), Error>;

    /// It inserts or replaces the record of a service. The spec must be stored
    /// already.
    ///
    /// # Context: Services
    ///
    /// # Errors
    ///
    /// Will return `Err` if unable to save.
    fn save_record(&self, record: &ServiceRecord) -> Result<(), Error>;

    /// It removes the spec and the record of a service.
    ///
    /// # Context: Services
    ///
    /// # Errors
    ///
    /// Will return `Err` if unable to remove.
    fn remove_service(&self, id: &ServiceId) -> Result<(), Error>;

    /// Returns `true` if the spec is stored.
    ///
    /// # Context: Services
    ///
    /// # Errors
    ///
    /// Will return `Err` if unable to load.
    fn is_service_stored(&self, id: &ServiceId) -> Result<bool, Error> {
        Ok(self.load_spec(id)?.is_some())
    }
}
