//! Database access layer for tracked mods.

use diesel::prelude::*;

use crate::db::DbConn;
use crate::domain::error::Result;
use crate::domain::instance::InstanceStats;
use crate::domain::mod_entry::{Mod, ModChanges, ModKey, NewMod};
use crate::schema::mods::dsl::*;

/// Lists all mods of one instance ordered by name.
pub fn list_by_instance(conn: &mut DbConn, instance: i64) -> Result<Vec<Mod>> {
	let rows = mods
		.filter(instance_id.eq(instance))
		.select(Mod::as_select())
		.order(name.asc())
		.load(conn)?;
	Ok(rows)
}

/// Retrieves a single mod by id.
pub fn get_by_id(conn: &mut DbConn, mod_id: ModKey) -> Result<Mod> {
	let row = mods.find(mod_id).first(conn)?;
	Ok(row)
}

/// Attempts to find a mod by id.
pub fn find_by_id(conn: &mut DbConn, mod_id: ModKey) -> Result<Option<Mod>> {
	let row = mods.find(mod_id).first(conn).optional()?;
	Ok(row)
}

/// Attempts to find a mod of an instance by its canonical catalog URL.
pub fn find_by_url(conn: &mut DbConn, instance: i64, mod_url: &str) -> Result<Option<Mod>> {
	let row = mods
		.filter(instance_id.eq(instance))
		.filter(url.eq(mod_url))
		.first(conn)
		.optional()?;
	Ok(row)
}

/// Creates a new mod row.
pub fn create(conn: &mut DbConn, entity: NewMod) -> Result<Mod> {
	let row = diesel::insert_into(mods)
		.values(entity)
		.returning(Mod::as_returning())
		.get_result(conn)?;
	Ok(row)
}

/// Applies a partial changeset to a mod and returns the new row.
pub fn update(conn: &mut DbConn, mod_id: ModKey, changes: &ModChanges) -> Result<Mod> {
	let row = diesel::update(mods.find(mod_id))
		.set(changes)
		.returning(Mod::as_returning())
		.get_result(conn)?;
	Ok(row)
}

/// Deletes a mod row.
pub fn delete(conn: &mut DbConn, mod_id: ModKey) -> Result<usize> {
	let deleted_count = diesel::delete(mods.find(mod_id)).execute(conn)?;
	Ok(deleted_count)
}

/// Moves all mods of one instance to another. Used when deleting an
/// instance with a reparent target.
pub fn reparent(conn: &mut DbConn, from_instance: i64, to_instance: i64) -> Result<usize> {
	let moved = diesel::update(mods.filter(instance_id.eq(from_instance)))
		.set(instance_id.eq(to_instance))
		.execute(conn)?;
	Ok(moved)
}

/// Computes the tracked/up-to-date/outdated counters for one instance.
pub fn stats(conn: &mut DbConn, instance: i64) -> Result<InstanceStats> {
	let tracked: i64 = mods
		.filter(instance_id.eq(instance))
		.count()
		.get_result(conn)?;
	let up_to_date: i64 = mods
		.filter(instance_id.eq(instance))
		.filter(available_version.eq(current_version))
		.count()
		.get_result(conn)?;
	Ok(InstanceStats {
		tracked,
		up_to_date,
		outdated: tracked - up_to_date,
	})
}

/// Global counters for the dashboard.
pub fn global_stats(conn: &mut DbConn) -> Result<InstanceStats> {
	let tracked: i64 = mods.count().get_result(conn)?;
	let up_to_date: i64 = mods
		.filter(available_version.eq(current_version))
		.count()
		.get_result(conn)?;
	Ok(InstanceStats {
		tracked,
		up_to_date,
		outdated: tracked - up_to_date,
	})
}
