use anyhow::Result;
use diesel::SqliteConnection;
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use tracing::{debug, info};

use crate::configuration::DatabaseSettings;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Enables the SQLite pragmas every pooled connection needs: foreign keys
/// for cascading deletes and a busy timeout so concurrent writers queue
/// instead of failing.
#[derive(Debug)]
struct ConnectionPragmas;

impl r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Creates a new database pool for the given SQLite path.
pub fn create_pool(database_path: &str) -> Result<DbPool> {
    create_pool_with_size(database_path, None)
}

/// Creates a new database pool from the given `DatabaseSettings`.
pub fn create_pool_from_settings(settings: &DatabaseSettings) -> Result<DbPool> {
    create_pool_with_size(&settings.path, settings.pool_size)
}

fn create_pool_with_size(database_path: &str, pool_size: Option<u32>) -> Result<DbPool> {
    assert_ne!(pool_size, Some(0), "r2d2 pool size must be greater than 0");
    info!("Opening database at: {}", database_path);

    let manager = ConnectionManager::<SqliteConnection>::new(database_path);
    let builder = Pool::builder()
        .test_on_check_out(true)
        .connection_customizer(Box::new(ConnectionPragmas));
    let pool = match pool_size {
        Some(size) => builder.max_size(size).build(manager)?,
        None => builder.build(manager)?,
    };

    debug!("Connection pool created. {:#?}", pool.state());
    Ok(pool)
}

/// Initializes the database pool based on the provided settings.
pub fn initialize_pool(settings: &DatabaseSettings) -> DbPool {
    create_pool_from_settings(settings).expect("Failed to create database pool")
}
