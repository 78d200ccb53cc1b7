//! Database access layer for instance entities.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::DbConn;
use crate::domain::error::Result;
use crate::domain::instance::{Instance, InstanceChanges, InstanceKey, NewInstance};
use crate::schema::instances::dsl::*;

/// Retrieves all instances ordered by id.
pub fn get_all(conn: &mut DbConn) -> Result<Vec<Instance>> {
	let rows = instances
		.select(Instance::as_select())
		.order(id.asc())
		.load(conn)?;
	Ok(rows)
}

/// Retrieves a single instance by id.
pub fn get_by_id(conn: &mut DbConn, instance_id: InstanceKey) -> Result<Instance> {
	let row = instances.find(instance_id).first(conn)?;
	Ok(row)
}

/// Attempts to find an instance by id.
pub fn find_by_id(conn: &mut DbConn, instance_id: InstanceKey) -> Result<Option<Instance>> {
	let row = instances.find(instance_id).first(conn).optional()?;
	Ok(row)
}

/// Attempts to find the instance bound to a remote server id.
pub fn find_by_server_id(conn: &mut DbConn, server_id: &str) -> Result<Option<Instance>> {
	let row = instances
		.filter(pufferpanel_server_id.eq(server_id))
		.first(conn)
		.optional()?;
	Ok(row)
}

/// Creates a new instance.
pub fn create(conn: &mut DbConn, entity: NewInstance) -> Result<Instance> {
	let row = diesel::insert_into(instances)
		.values(entity)
		.returning(Instance::as_returning())
		.get_result(conn)?;
	Ok(row)
}

/// Applies a partial changeset to an instance and returns the new row.
pub fn update(
	conn: &mut DbConn,
	instance_id: InstanceKey,
	changes: &InstanceChanges,
) -> Result<Instance> {
	let row = diesel::update(instances.find(instance_id))
		.set(changes)
		.returning(Instance::as_returning())
		.get_result(conn)?;
	Ok(row)
}

/// Stamps the last successful sync time.
pub fn touch_last_sync(
	conn: &mut DbConn,
	instance_id: InstanceKey,
	at: DateTime<Utc>,
) -> Result<()> {
	diesel::update(instances.find(instance_id))
		.set(last_sync_at.eq(Some(at)))
		.execute(conn)?;
	Ok(())
}

/// Deletes an instance. Mods cascade unless reparented beforehand.
pub fn delete(conn: &mut DbConn, instance_id: InstanceKey) -> Result<usize> {
	let deleted_count = diesel::delete(instances.find(instance_id)).execute(conn)?;
	Ok(deleted_count)
}

/// Total instance count for the dashboard.
pub fn count(conn: &mut DbConn) -> Result<i64> {
	let total = instances.count().get_result(conn)?;
	Ok(total)
}
