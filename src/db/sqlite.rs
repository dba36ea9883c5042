use crate::error::{Error, Result};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::debug;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// SQLite's default SQLITE_MAX_VARIABLE_NUMBER since 3.32.
pub const SQLITE_MAX_PARAMETERS: usize = 32766;

/// Open the registry database, configure it and bring the schema up to date.
pub fn establish_connection(database_url: &str) -> Result<SqliteConnection> {
    let mut connection = SqliteConnection::establish(database_url)?;
    configure_pragmas(&mut connection)?;
    run_migrations(&mut connection)?;
    Ok(connection)
}

pub fn establish_in_memory() -> Result<SqliteConnection> {
    establish_connection(":memory:")
}

fn configure_pragmas(connection: &mut SqliteConnection) -> Result<()> {
    connection.batch_execute(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    debug!("SQLite pragmas configured (WAL mode, foreign keys on)");
    Ok(())
}

fn run_migrations(connection: &mut SqliteConnection) -> Result<()> {
    let applied = connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| Error::Migration(err.to_string()))?;
    for version in &applied {
        debug!("Applied migration {}", version);
    }
    Ok(())
}
