//! Database access layer for durable sync-job rows.

use chrono::Utc;
use diesel::prelude::*;

use crate::db::DbConn;
use crate::domain::error::Result;
use crate::domain::sync_job::{JobStatus, NewSyncJob, SyncJob, SyncJobKey};
use crate::schema::sync_jobs::dsl::*;

/// Inserts a queued job or returns the existing row for the same
/// `(instance_id, idempotency_key)`. The boolean reports whether a new
/// row was created.
pub fn insert_or_get(conn: &mut DbConn, entity: NewSyncJob) -> Result<(SyncJob, bool)> {
	let inserted = diesel::insert_into(sync_jobs)
		.values(&entity)
		.on_conflict((instance_id, idempotency_key))
		.do_nothing()
		.execute(conn)?;
	let row = sync_jobs
		.filter(instance_id.eq(entity.instance_id))
		.filter(idempotency_key.eq(&entity.idempotency_key))
		.first(conn)?;
	Ok((row, inserted > 0))
}

/// Retrieves a single job by id.
pub fn get_by_id(conn: &mut DbConn, job_id: SyncJobKey) -> Result<SyncJob> {
	let row = sync_jobs.find(job_id).first(conn)?;
	Ok(row)
}

pub fn find_by_id(conn: &mut DbConn, job_id: SyncJobKey) -> Result<Option<SyncJob>> {
	let row = sync_jobs.find(job_id).first(conn).optional()?;
	Ok(row)
}

/// Marks a job running and stamps the start time.
pub fn mark_running(conn: &mut DbConn, job_id: SyncJobKey) -> Result<()> {
	diesel::update(sync_jobs.find(job_id))
		.set((status.eq(JobStatus::Running), started_at.eq(Some(Utc::now()))))
		.execute(conn)?;
	Ok(())
}

/// Marks a job terminal with an optional error message.
pub fn mark_finished(
	conn: &mut DbConn,
	job_id: SyncJobKey,
	final_status: JobStatus,
	err: Option<&str>,
) -> Result<()> {
	diesel::update(sync_jobs.find(job_id))
		.set((
			status.eq(final_status),
			finished_at.eq(Some(Utc::now())),
			error.eq(err),
		))
		.execute(conn)?;
	Ok(())
}

/// Crash recovery: every `running` row goes back to `queued`. Returns
/// the affected ids so the scheduler can republish them.
pub fn reset_running_to_queued(conn: &mut DbConn) -> Result<Vec<SyncJobKey>> {
	let ids: Vec<SyncJobKey> = sync_jobs
		.filter(status.eq(JobStatus::Running))
		.select(id)
		.load(conn)?;
	if !ids.is_empty() {
		diesel::update(sync_jobs.filter(status.eq(JobStatus::Running)))
			.set(status.eq(JobStatus::Queued))
			.execute(conn)?;
	}
	Ok(ids)
}

/// All queued job ids in enqueue order, for startup republishing.
pub fn queued_ids(conn: &mut DbConn) -> Result<Vec<SyncJobKey>> {
	let ids = sync_jobs
		.filter(status.eq(JobStatus::Queued))
		.order(created_at.asc())
		.select(id)
		.load(conn)?;
	Ok(ids)
}

/// Number of rows for one instance, used by idempotency tests.
pub fn count_for_instance(conn: &mut DbConn, instance: i64) -> Result<i64> {
	let total = sync_jobs
		.filter(instance_id.eq(instance))
		.count()
		.get_result(conn)?;
	Ok(total)
}
