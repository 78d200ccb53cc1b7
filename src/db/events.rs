//! Append-only audit events for mod lifecycle changes.

use diesel::prelude::*;

use crate::db::DbConn;
use crate::domain::error::Result;
use crate::domain::event::{Event, EventAction, NewEvent};
use crate::schema::events::dsl::*;

/// Appends one audit event.
pub fn insert(conn: &mut DbConn, entity: NewEvent) -> Result<Event> {
	let row = diesel::insert_into(events)
		.values(entity)
		.returning(Event::as_returning())
		.get_result(conn)?;
	Ok(row)
}

/// Lists events for one instance, newest first.
pub fn list_by_instance(conn: &mut DbConn, instance: i64, limit: i64) -> Result<Vec<Event>> {
	let rows = events
		.filter(instance_id.eq(instance))
		.order(created_at.desc())
		.limit(limit)
		.select(Event::as_select())
		.load(conn)?;
	Ok(rows)
}

/// Most recent "updated" events across all instances, for the dashboard.
pub fn recent_updates(conn: &mut DbConn, limit: i64) -> Result<Vec<Event>> {
	let rows = events
		.filter(action.eq(EventAction::Updated))
		.order(created_at.desc())
		.limit(limit)
		.select(Event::as_select())
		.load(conn)?;
	Ok(rows)
}
