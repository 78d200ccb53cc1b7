//! Database access layer for durable update-job rows.

use chrono::Utc;
use diesel::prelude::*;

use crate::db::DbConn;
use crate::domain::error::{Error, Result};
use crate::domain::update_job::{NewUpdateJob, UpdateJob, UpdateJobKey, UpdateState};
use crate::schema::mod_updates::dsl::*;

/// Inserts a queued update job or returns the existing row for the same
/// `(mod_id, idempotency_key)`.
pub fn insert_or_get(conn: &mut DbConn, entity: NewUpdateJob) -> Result<(UpdateJob, bool)> {
	let inserted = diesel::insert_into(mod_updates)
		.values(&entity)
		.on_conflict((mod_id, idempotency_key))
		.do_nothing()
		.execute(conn)?;
	let row = mod_updates
		.filter(mod_id.eq(entity.mod_id))
		.filter(idempotency_key.eq(&entity.idempotency_key))
		.first(conn)?;
	Ok((row, inserted > 0))
}

/// Retrieves a single update job by id.
pub fn get_by_id(conn: &mut DbConn, job_id: UpdateJobKey) -> Result<UpdateJob> {
	let row = mod_updates.find(job_id).first(conn)?;
	Ok(row)
}

pub fn find_by_id(conn: &mut DbConn, job_id: UpdateJobKey) -> Result<Option<UpdateJob>> {
	let row = mod_updates.find(job_id).first(conn).optional()?;
	Ok(row)
}

/// Persists a state transition. Terminal states stamp the finish time.
///
/// The transition is checked against the state machine: writing the
/// current state again is an idempotent no-op (a cancel can race the
/// executor's own terminal write), any other illegal move is rejected.
pub fn set_state(
	conn: &mut DbConn,
	job_id: UpdateJobKey,
	next: UpdateState,
	err: Option<&str>,
) -> Result<()> {
	let current: UpdateState = mod_updates.find(job_id).select(status).first(conn)?;
	if current == next {
		return Ok(());
	}
	if !current.can_transition(next) {
		return Err(Error::internal(format!(
			"illegal update transition {} -> {}",
			current.as_str(),
			next.as_str()
		)));
	}

	let finished = next.is_terminal().then(Utc::now);
	diesel::update(mod_updates.find(job_id))
		.set((status.eq(next), error.eq(err), finished_at.eq(finished)))
		.execute(conn)?;
	Ok(())
}

/// Crash recovery: every live non-queued row goes back to `queued`.
pub fn reset_running_to_queued(conn: &mut DbConn) -> Result<Vec<UpdateJobKey>> {
	let live = [
		UpdateState::Running,
		UpdateState::UploadingNew,
		UpdateState::VerifyingNew,
		UpdateState::RemovingOld,
		UpdateState::VerifyingRemoval,
		UpdateState::UpdatingDb,
	];
	let ids: Vec<UpdateJobKey> = mod_updates
		.filter(status.eq_any(live))
		.select(id)
		.load(conn)?;
	if !ids.is_empty() {
		diesel::update(mod_updates.filter(status.eq_any(live)))
			.set(status.eq(UpdateState::Queued))
			.execute(conn)?;
	}
	Ok(ids)
}

/// All queued update ids in enqueue order, for startup republishing.
pub fn queued_ids(conn: &mut DbConn) -> Result<Vec<UpdateJobKey>> {
	let ids = mod_updates
		.filter(status.eq(UpdateState::Queued))
		.order(created_at.asc())
		.select(id)
		.load(conn)?;
	Ok(ids)
}

/// Most recent terminal updates for the dashboard.
pub fn recent(conn: &mut DbConn, limit: i64) -> Result<Vec<UpdateJob>> {
	let rows = mod_updates
		.filter(status.eq(UpdateState::Succeeded))
		.order(finished_at.desc())
		.limit(limit)
		.select(UpdateJob::as_select())
		.load(conn)?;
	Ok(rows)
}
