//! Memoized filename-candidate to catalog-slug mappings.

use chrono::Utc;
use diesel::prelude::*;

use crate::db::DbConn;
use crate::domain::error::Result;
use crate::schema::slug_aliases::dsl::*;

/// Looks up a learned slug for a normalized filename candidate.
pub fn find(conn: &mut DbConn, instance: i64, cand: &str) -> Result<Option<String>> {
	let found = slug_aliases
		.filter(instance_id.eq(instance))
		.filter(candidate.eq(cand))
		.select(slug)
		.first(conn)
		.optional()?;
	Ok(found)
}

/// Memoizes a successful resolution. Concurrent writers converge on the
/// last written mapping.
pub fn upsert(conn: &mut DbConn, instance: i64, cand: &str, resolved: &str) -> Result<()> {
	diesel::insert_into(slug_aliases)
		.values((
			instance_id.eq(instance),
			candidate.eq(cand),
			slug.eq(resolved),
			created_at.eq(Utc::now()),
		))
		.on_conflict((instance_id, candidate))
		.do_update()
		.set(slug.eq(resolved))
		.execute(conn)?;
	Ok(())
}
