//! Database errors.
//!
//! This module contains the [Database errors](crate::core::databases::error::Error).
use std::panic::Location;
use std::sync::Arc;

use hxe_configuration::Driver;
use hxe_located_error::{DynError, Located, LocatedError};
use r2d2_sqlite::rusqlite;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// The query unexpectedly returned nothing.
    #[error("The {driver} query unexpectedly returned nothing: {source}")]
    QueryReturnedNoRows {
        source: LocatedError<'static, dyn std::error::Error + Send + Sync>,
        driver: Driver,
    },

    /// The query was malformed.
    #[error("The {driver} query was malformed: {source}")]
    InvalidQuery {
        source: LocatedError<'static, dyn std::error::Error + Send + Sync>,
        driver: Driver,
    },

    /// A stored value could not be converted back into a spec or a record.
    #[error("The {driver} database holds malformed data: {source}")]
    MalformedData {
        source: LocatedError<'static, dyn std::error::Error + Send + Sync>,
        driver: Driver,
    },

    /// Unable to insert a record into the database
    #[error("Unable to insert record into {driver} database, {location}")]
    InsertFailed {
        location: &'static Location<'static>,
        driver: Driver,
    },

    /// Unable to delete a record into the database
    #[error("Failed to remove record from {driver} database, error-code: {error_code}, {location}")]
    DeleteFailed {
        location: &'static Location<'static>,
        error_code: usize,
        driver: Driver,
    },

    /// Unable to create the directory holding the database.
    #[error("Failed to create the {driver} database directory: {source}")]
    DirectoryCreation {
        source: LocatedError<'static, std::io::Error>,
        driver: Driver,
    },

    /// Unable to create a connection pool
    #[error("Failed to create r2d2 {driver} connection pool: {source}")]
    ConnectionPool {
        source: LocatedError<'static, r2d2::Error>,
        driver: Driver,
    },
}

impl From<rusqlite::Error> for Error {
    #[track_caller]
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => Error::QueryReturnedNoRows {
                source: (Arc::new(err) as DynError).into(),
                driver: Driver::Sqlite3,
            },
            _ => Error::InvalidQuery {
                source: (Arc::new(err) as DynError).into(),
                driver: Driver::Sqlite3,
            },
        }
    }
}

impl From<(serde_json::Error, Driver)> for Error {
    #[track_caller]
    fn from(e: (serde_json::Error, Driver)) -> Self {
        let (err, driver) = e;
        Self::MalformedData {
            source: (Arc::new(err) as DynError).into(),
            driver,
        }
    }
}

impl From<(hxe_primitives::UnknownState, Driver)> for Error {
    #[track_caller]
    fn from(e: (hxe_primitives::UnknownState, Driver)) -> Self {
        let (err, driver) = e;
        Self::MalformedData {
            source: (Arc::new(err) as DynError).into(),
            driver,
        }
    }
}

impl From<(std::io::Error, Driver)> for Error {
    #[track_caller]
    fn from(e: (std::io::Error, Driver)) -> Self {
        let (err, driver) = e;
        Self::DirectoryCreation {
            source: Located(err).into(),
            driver,
        }
    }
}

impl From<(r2d2::Error, Driver)> for Error {
    #[track_caller]
    fn from(e: (r2d2::Error, Driver)) -> Self {
        let (err, driver) = e;
        Self::ConnectionPool {
            source: Located(err).into(),
            driver,
        }
    }
}
