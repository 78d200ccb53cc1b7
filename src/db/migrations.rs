use std::error::Error;

use diesel::sqlite::Sqlite;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Runs all pending migrations on the given database connection.
///
/// Migration ids are applied in lexicographic order and recorded in the
/// schema-migrations ledger, so restarts are no-ops.
pub fn run_pending(
	connection: &mut impl MigrationHarness<Sqlite>,
) -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
	connection.run_pending_migrations(MIGRATIONS)?;

	Ok(())
}

/// Startup helper: a database we cannot migrate is fatal.
pub fn run_migrations_or_die(pool: &crate::db::DbPool) {
	let mut conn = pool.get().expect("Failed to get database connection");
	run_pending(&mut conn).expect("Should execute pending migrations");
}
