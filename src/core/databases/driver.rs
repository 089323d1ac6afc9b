//! Database driver factory.
//!
//! See [`databases::driver::build`](crate::core::databases::driver::build)
//! function for more information.
use hxe_configuration::Driver;

use super::error::Error;
use super::memory::Memory;
use super::sqlite::Sqlite;
use super::Database;

/// It builds a new database driver.
///
/// Example for `SQLite3`:
///
/// ```rust,no_run
/// use hxe::core::databases;
/// use hxe_configuration::Driver;
///
/// let db_driver = Driver::Sqlite3;
/// let db_path = "./storage/hxe/lib/database/data.db".to_string();
/// let database = databases::driver::build(&db_driver, &db_path);
/// ```
///
/// The `memory` driver ignores the path.
///
/// # Errors
///
/// This function will return an error if unable to connect to the database
/// or unable to create the tables.
pub fn build(driver: &Driver, db_path: &str) -> Result<Box<dyn Database>, Error> {
    let database: Box<dyn Database> = match driver {
        Driver::Sqlite3 => Box::new(Sqlite::new(db_path)?),
        Driver::Memory => Box::new(Memory::default()),
    };

    database.create_database_tables()?;

    Ok(database)
}
