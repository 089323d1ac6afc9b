//! The `SQLite3` database driver.
use std::panic::Location;
use std::path::Path;

use chrono::DateTime;
use hxe_configuration::Driver;
use hxe_primitives::{ServiceId, ServiceRecord, ServiceSpec, ServiceState};
use r2d2::Pool;
use r2d2_sqlite::rusqlite::{params, OptionalExtension};
use r2d2_sqlite::SqliteConnectionManager;

use super::{Database, Error, StoredService};

const DRIVER: Driver = Driver::Sqlite3;

pub struct Sqlite {
    pool: Pool<SqliteConnectionManager>,
}

/// The columns of a `service_records` row, before conversion.
struct RecordRow {
    state: String,
    pid: u32,
    exit_code: i32,
    started_at: Option<i64>,
    ended_at: Option<i64>,
    retry_count: u32,
    last_error: Option<String>,
}

impl RecordRow {
    fn into_record(self, id: ServiceId) -> Result<ServiceRecord, Error> {
        let state = self.state.parse::<ServiceState>().map_err(|e| (e, DRIVER))?;

        Ok(ServiceRecord {
            id,
            state,
            pid: self.pid,
            exit_code: self.exit_code,
            started_at: self.started_at.and_then(DateTime::from_timestamp_millis),
            ended_at: self.ended_at.and_then(DateTime::from_timestamp_millis),
            retry_count: self.retry_count,
            last_error: self.last_error,
        })
    }
}

impl Sqlite {
    /// It instantiates a new `SQLite3` database driver.
    ///
    /// Refer to [`databases::Database::new`](crate::core::databases::Database::new).
    ///
    /// # Errors
    ///
    /// Will return `r2d2::Error` if `db_path` is not able to create `SqLite` database.
    pub fn new(db_path: &str) -> Result<Sqlite, Error> {
        if let Some(directory) = Path::new(db_path).parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(directory).map_err(|e| (e, DRIVER))?;
        }

        let cm = SqliteConnectionManager::file(db_path).with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        Pool::new(cm).map_or_else(|err| Err((err, DRIVER).into()), |pool| Ok(Sqlite { pool }))
    }
}

impl Database for Sqlite {
    /// Refer to [`databases::Database::create_database_tables`](crate::core::databases::Database::create_database_tables).
    fn create_database_tables(&self) -> Result<(), Error> {
        let create_specs_table = "
        CREATE TABLE IF NOT EXISTS service_specs (
            id TEXT PRIMARY KEY NOT NULL,
            definition TEXT NOT NULL
        );"
        .to_string();

        let create_records_table = "
        CREATE TABLE IF NOT EXISTS service_records (
            id TEXT PRIMARY KEY NOT NULL REFERENCES service_specs(id) ON DELETE CASCADE,
            state TEXT NOT NULL,
            pid INTEGER NOT NULL DEFAULT 0,
            exit_code INTEGER NOT NULL DEFAULT 0,
            started_at INTEGER,
            ended_at INTEGER,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT
        );"
        .to_string();

        let conn = self.pool.get().map_err(|e| (e, DRIVER))?;

        conn.execute(&create_specs_table, [])?;
        conn.execute(&create_records_table, [])?;

        Ok(())
    }

    /// Refer to [`databases::Database::drop_database_tables`](crate::core::databases::Database::drop_database_tables).
    fn drop_database_tables(&self) -> Result<(), Error> {
        let drop_records_table = "
        DROP TABLE service_records;"
            .to_string();

        let drop_specs_table = "
        DROP TABLE service_specs;"
            .to_string();

        let conn = self.pool.get().map_err(|e| (e, DRIVER))?;

        conn.execute(&drop_records_table, [])
            .and_then(|_| conn.execute(&drop_specs_table, []))?;

        Ok(())
    }

    /// Refer to [`databases::Database::load_services`](crate::core::databases::Database::load_services).
    fn load_services(&self) -> Result<Vec<StoredService>, Error> {
        let conn = self.pool.get().map_err(|e| (e, DRIVER))?;

        let mut stmt = conn.prepare(
            "SELECT s.id, s.definition, r.state, r.pid, r.exit_code, r.started_at, r.ended_at, r.retry_count, r.last_error
             FROM service_specs s LEFT JOIN service_records r ON r.id = s.id
             ORDER BY s.id",
        )?;

        let rows = stmt.query_map([], |row| {
            let definition: String = row.get(1)?;
            let state: Option<String> = row.get(2)?;

            let record = match state {
                Some(state) => Some(RecordRow {
                    state,
                    pid: row.get(3)?,
                    exit_code: row.get(4)?,
                    started_at: row.get(5)?,
                    ended_at: row.get(6)?,
                    retry_count: row.get(7)?,
                    last_error: row.get(8)?,
                }),
                None => None,
            };

            Ok((definition, record))
        })?;

        let mut services = Vec::new();

        for row in rows {
            let (definition, record) = row?;

            let spec: ServiceSpec = serde_json::from_str(&definition).map_err(|e| (e, DRIVER))?;
            let record = record.map(|record| record.into_record(spec.id.clone())).transpose()?;

            services.push((spec, record));
        }

        Ok(services)
    }

    /// Refer to [`databases::Database::load_spec`](crate::core::databases::Database::load_spec).
    fn load_spec(&self, id: &ServiceId) -> Result<Option<ServiceSpec>, Error> {
        let conn = self.pool.get().map_err(|e| (e, DRIVER))?;

        let mut stmt = conn.prepare("SELECT definition FROM service_specs WHERE id = ?")?;

        let definition: Option<String> = stmt.query_row([id.as_str()], |row| row.get(0)).optional()?;

        definition
            .map(|definition| serde_json::from_str(&definition).map_err(|e| (e, DRIVER).into()))
            .transpose()
    }

    /// Refer to [`databases::Database::save_spec`](crate::core::databases::Database::save_spec).
    fn save_spec(&self, spec: &ServiceSpec) -> Result<(), Error> {
        let conn = self.pool.get().map_err(|e| (e, DRIVER))?;

        let definition = serde_json::to_string(spec).map_err(|e| (e, DRIVER))?;

        let insert = conn.execute(
            "INSERT INTO service_specs (id, definition) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET definition = excluded.definition",
            params![spec.id.as_str(), definition],
        )?;

        if insert == 0 {
            Err(Error::InsertFailed {
                location: Location::caller(),
                driver: DRIVER,
            })
        } else {
            Ok(())
        }
    }

    /// Refer to [`databases::Database::save_record`](crate::core::databases::Database::save_record).
    fn save_record(&self, record: &ServiceRecord) -> Result<(), Error> {
        let conn = self.pool.get().map_err(|e| (e, DRIVER))?;

        let insert = conn.execute(
            "INSERT INTO service_records (id, state, pid, exit_code, started_at, ended_at, retry_count, last_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                pid = excluded.pid,
                exit_code = excluded.exit_code,
                started_at = excluded.started_at,
                ended_at = excluded.ended_at,
                retry_count = excluded.retry_count,
                last_error = excluded.last_error",
            params![
                record.id.as_str(),
                record.state.to_string(),
                record.pid,
                record.exit_code,
                record.started_at.map(|at| at.timestamp_millis()),
                record.ended_at.map(|at| at.timestamp_millis()),
                record.retry_count,
                record.last_error,
            ],
        )?;

        if insert == 0 {
            Err(Error::InsertFailed {
                location: Location::caller(),
                driver: DRIVER,
            })
        } else {
            Ok(())
        }
    }

    /// Refer to [`databases::Database::remove_service`](crate::core::databases::Database::remove_service).
    fn remove_service(&self, id: &ServiceId) -> Result<(), Error> {
        let conn = self.pool.get().map_err(|e| (e, DRIVER))?;

        let deleted = conn.execute("DELETE FROM service_specs WHERE id = ?", [id.as_str()])?;

        if deleted == 1 {
            // should only remove a single record.
            Ok(())
        } else {
            Err(Error::DeleteFailed {
                location: Location::caller(),
                error_code: deleted,
                driver: DRIVER,
            })
        }
    }
}
