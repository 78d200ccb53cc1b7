//! The scheduler engine.
//!
//! All mutable scheduler state lives behind this value: job queues, the
//! global and per-instance semaphores, per-instance update locks, the
//! progress map and the cancellation map. Handlers get an `Arc<Engine>`
//! through the application state and talk to jobs exclusively via
//! enqueue/cancel/retry/snapshot/subscribe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use ulid::Ulid;

use crate::clients::modrinth::CatalogClient;
use crate::clients::pufferpanel::PufferClient;
use crate::configuration::SchedulerSettings;
use crate::db::{self, DbPool};
use crate::domain::instance::Instance;
use crate::domain::mod_entry::Mod;
use crate::domain::sync_job::{JobStatus, NewSyncJob};
use crate::domain::update_job::{NewUpdateJob, UpdateState};
use crate::jobs::progress::{Progress, ProgressSnapshot};
use crate::jobs::update::UpdateOutcome;
use crate::jobs::{ExecutorContext, JobId, sync, update};
use crate::{Error, ErrorKind, Result};

struct Shared {
	progress: HashMap<JobId, Arc<Progress>>,
	cancels: HashMap<JobId, CancellationToken>,
	/// Per-instance sync gates, capacity P each.
	gates: HashMap<i64, Arc<Semaphore>>,
	/// Per-instance binary locks serializing update executors.
	update_locks: HashMap<i64, Arc<tokio::sync::Mutex<()>>>,
	/// Retry scope: sync job id -> file names to process.
	only: HashMap<i64, Vec<String>>,
}

pub struct Engine {
	ctx: ExecutorContext,
	per_instance_limit: usize,
	queue_capacity: usize,
	global: Arc<Semaphore>,
	sync_tx: mpsc::Sender<i64>,
	update_tx: mpsc::Sender<i64>,
	shared: Mutex<Shared>,
	/// Stops the intake loop.
	root: CancellationToken,
	/// Hard-stops in-flight jobs once the shutdown grace has elapsed.
	jobs_root: CancellationToken,
	active: AtomicUsize,
	shutdown_grace: Duration,
}

impl Engine {
	/// Builds the engine and its runner. The runner owns the queue
	/// receivers and must be spawned exactly once.
	pub fn new(
		pool: DbPool,
		remote: Arc<dyn PufferClient>,
		catalog: Arc<dyn CatalogClient>,
		settings: &SchedulerSettings,
		root: CancellationToken,
	) -> (Arc<Engine>, EngineRunner) {
		let (sync_tx, sync_rx) = mpsc::channel(settings.queue_capacity);
		let (update_tx, update_rx) = mpsc::channel(settings.queue_capacity);
		let engine = Arc::new(Engine {
			ctx: ExecutorContext {
				pool,
				remote,
				catalog,
			},
			per_instance_limit: settings.per_instance_limit,
			queue_capacity: settings.queue_capacity,
			global: Arc::new(Semaphore::new(settings.global_limit)),
			sync_tx,
			update_tx,
			shared: Mutex::new(Shared {
				progress: HashMap::new(),
				cancels: HashMap::new(),
				gates: HashMap::new(),
				update_locks: HashMap::new(),
				only: HashMap::new(),
			}),
			root,
			jobs_root: CancellationToken::new(),
			active: AtomicUsize::new(0),
			shutdown_grace: Duration::from_secs(settings.shutdown_grace_seconds),
		});
		let runner = EngineRunner {
			engine: Arc::clone(&engine),
			sync_rx,
			update_rx,
		};
		(engine, runner)
	}

	pub fn context(&self) -> &ExecutorContext {
		&self.ctx
	}

	/// Idempotent sync enqueue: the same `(instance, key)` always maps to
	/// one durable row; duplicates get the existing id and completion
	/// handle back.
	#[instrument(skip(self, instance), fields(instance_id = instance.id))]
	pub async fn enqueue_sync(
		&self,
		instance: &Instance,
		server_id: &str,
		key: Option<String>,
	) -> Result<(JobId, watch::Receiver<bool>)> {
		let key = key.unwrap_or_else(|| Ulid::new().to_string());
		let mut conn = self.ctx.pool.get()?;
		let (row, created) = db::sync_jobs::insert_or_get(
			&mut conn,
			NewSyncJob::queued(instance.id, server_id.to_string(), key),
		)?;
		drop(conn);

		let job_id = JobId::Sync(row.id);
		let progress = self.progress_entry(job_id, row.status);
		if !created {
			debug!(%job_id, "Duplicate enqueue, returning existing job");
			return Ok((job_id, progress.completion()));
		}

		self.cancel_token(job_id);
		self.publish_sync(row.id).await?;
		Ok((job_id, progress.completion()))
	}

	/// Idempotent update enqueue keyed by `(mod, key)`.
	#[instrument(skip(self, entry), fields(mod_id = entry.id))]
	pub async fn enqueue_update(&self, entry: &Mod, key: String) -> Result<JobId> {
		let mut conn = self.ctx.pool.get()?;
		let (row, created) = db::mod_updates::insert_or_get(
			&mut conn,
			NewUpdateJob::queued(
				entry.id,
				entry.current_version.clone(),
				entry.available_version.clone(),
				key,
			),
		)?;
		drop(conn);

		let job_id = JobId::Update(row.id);
		self.progress_entry(job_id, coarse_status(row.status));
		if !created {
			debug!(%job_id, "Duplicate enqueue, returning existing job");
			return Ok(job_id);
		}

		self.cancel_token(job_id);
		self.update_tx
			.send(row.id)
			.await
			.map_err(|_| Error::internal("scheduler stopped"))?;
		self.note_queue_depth();
		Ok(job_id)
	}

	/// Cancels a job: queued jobs flip straight to canceled, running jobs
	/// get their cancellation token invoked and finish cooperatively.
	pub async fn cancel(&self, job_id: JobId) -> Result<()> {
		let token = {
			let shared = self.shared.lock().unwrap();
			shared.cancels.get(&job_id).cloned()
		};
		let progress = self.find_progress(job_id)?;

		if let Some(token) = token {
			token.cancel();
		}
		if progress.snapshot().status == JobStatus::Queued.as_str() {
			let mut conn = self.ctx.pool.get()?;
			match job_id {
				JobId::Sync(id) => {
					db::sync_jobs::mark_finished(&mut conn, id, JobStatus::Canceled, None)?
				}
				JobId::Update(id) => {
					db::mod_updates::set_state(&mut conn, id, UpdateState::Canceled, None)?
				}
			}
			progress.set_status(JobStatus::Canceled);
		}
		info!(%job_id, "Cancel requested");
		Ok(())
	}

	/// Re-runs a terminal job restricted to its recorded failures.
	pub async fn retry_failed(&self, job_id: JobId) -> Result<JobId> {
		let JobId::Sync(old_id) = job_id else {
			return Err(Error::bad_request("only sync jobs can be retried"));
		};
		let progress = self.find_progress(job_id)?;
		if !progress.is_done() {
			return Err(Error::conflict("job is still queued or running"));
		}
		let failures = progress.failures();
		if failures.is_empty() {
			return Err(Error::bad_request("job has no recorded failures"));
		}

		let mut conn = self.ctx.pool.get()?;
		let old_row = db::sync_jobs::get_by_id(&mut conn, old_id)?;
		let (row, created) = db::sync_jobs::insert_or_get(
			&mut conn,
			NewSyncJob::queued(
				old_row.instance_id,
				old_row.server_id.clone(),
				format!("retry-{}", Ulid::new()),
			),
		)?;
		drop(conn);
		debug_assert!(created);

		let new_id = JobId::Sync(row.id);
		self.progress_entry(new_id, JobStatus::Queued);
		self.cancel_token(new_id);
		{
			let mut shared = self.shared.lock().unwrap();
			shared
				.only
				.insert(row.id, failures.into_iter().map(|f| f.name).collect());
		}
		self.publish_sync(row.id).await?;
		info!(old = %job_id, new = %new_id, "Retry enqueued for failed files");
		Ok(new_id)
	}

	/// Snapshot for the polling endpoint. Jobs from earlier processes are
	/// served from their durable rows.
	pub fn snapshot(&self, job_id: JobId) -> Result<ProgressSnapshot> {
		Ok(self.find_progress(job_id)?.snapshot())
	}

	/// Progress handle for streaming. Restores a terminal-state handle
	/// for jobs that predate this process.
	pub fn progress(&self, job_id: JobId) -> Result<Arc<Progress>> {
		self.find_progress(job_id)
	}

	/// Applies an update synchronously: enqueue-or-reuse the durable row,
	/// execute in place and return the refreshed mod.
	pub async fn run_update_inline(&self, entry: &Mod) -> Result<Mod> {
		let key = format!("apply-{}", entry.available_version);
		let mut conn = self.ctx.pool.get()?;
		let (row, created) = db::mod_updates::insert_or_get(
			&mut conn,
			NewUpdateJob::queued(
				entry.id,
				entry.current_version.clone(),
				entry.available_version.clone(),
				key,
			),
		)?;
		drop(conn);

		let job_id = JobId::Update(row.id);
		if !created && row.status.is_terminal() {
			// A finished application of this exact version; nothing to do.
			let mut conn = self.ctx.pool.get()?;
			return db::mods::get_by_id(&mut conn, entry.id);
		}
		self.progress_entry(job_id, coarse_status(row.status));
		self.cancel_token(job_id);

		match self.execute_update(row.id).await? {
			UpdateOutcome {
				state: UpdateState::PartialSuccess,
				reason,
			} => Err((
				ErrorKind::BadGateway,
				"update partially applied",
				reason.unwrap_or_default(),
			)
				.into()),
			_ => {
				let mut conn = self.ctx.pool.get()?;
				db::mods::get_by_id(&mut conn, entry.id)
			}
		}
	}

	/// Crash recovery: running rows return to queued and every queued id
	/// is republished.
	pub async fn recover(&self) -> Result<()> {
		let (reset_sync, reset_updates, sync_ids, update_ids) = {
			let mut conn = self.ctx.pool.get()?;
			let reset_sync = db::sync_jobs::reset_running_to_queued(&mut conn)?;
			let reset_updates = db::mod_updates::reset_running_to_queued(&mut conn)?;
			let sync_ids = db::sync_jobs::queued_ids(&mut conn)?;
			let update_ids = db::mod_updates::queued_ids(&mut conn)?;
			(reset_sync, reset_updates, sync_ids, update_ids)
		};
		if !reset_sync.is_empty() || !reset_updates.is_empty() {
			info!(
				sync = reset_sync.len(),
				updates = reset_updates.len(),
				"Requeued jobs left running by a previous process"
			);
		}
		for id in sync_ids {
			self.progress_entry(JobId::Sync(id), JobStatus::Queued);
			self.cancel_token(JobId::Sync(id));
			self.publish_sync(id).await?;
		}
		for id in update_ids {
			self.progress_entry(JobId::Update(id), JobStatus::Queued);
			self.cancel_token(JobId::Update(id));
			self.update_tx
				.send(id)
				.await
				.map_err(|_| Error::internal("scheduler stopped"))?;
		}
		Ok(())
	}

	async fn publish_sync(&self, id: i64) -> Result<()> {
		self.sync_tx
			.send(id)
			.await
			.map_err(|_| Error::internal("scheduler stopped"))?;
		self.note_queue_depth();
		Ok(())
	}

	fn note_queue_depth(&self) {
		debug!(
			sync_queue = self.queue_capacity - self.sync_tx.capacity(),
			update_queue = self.queue_capacity - self.update_tx.capacity(),
			active = self.active.load(Ordering::Relaxed),
			"Scheduler queue state"
		);
	}

	fn progress_entry(&self, job_id: JobId, status: JobStatus) -> Arc<Progress> {
		let mut shared = self.shared.lock().unwrap();
		Arc::clone(
			shared
				.progress
				.entry(job_id)
				.or_insert_with(|| Progress::with_status(job_id, status)),
		)
	}

	fn cancel_token(&self, job_id: JobId) -> CancellationToken {
		let mut shared = self.shared.lock().unwrap();
		shared
			.cancels
			.entry(job_id)
			.or_insert_with(|| self.jobs_root.child_token())
			.clone()
	}

	/// In-memory progress, or a handle restored from the durable row.
	fn find_progress(&self, job_id: JobId) -> Result<Arc<Progress>> {
		{
			let shared = self.shared.lock().unwrap();
			if let Some(progress) = shared.progress.get(&job_id) {
				return Ok(Arc::clone(progress));
			}
		}
		let mut conn = self.ctx.pool.get()?;
		match job_id {
			JobId::Sync(id) => {
				let row = db::sync_jobs::find_by_id(&mut conn, id)?
					.ok_or_else(|| Error::not_found(format!("job {job_id}")))?;
				Ok(self.progress_entry(job_id, row.status))
			}
			JobId::Update(id) => {
				let row = db::mod_updates::find_by_id(&mut conn, id)?
					.ok_or_else(|| Error::not_found(format!("job {job_id}")))?;
				let progress = self.progress_entry(job_id, coarse_status(row.status));
				// Keep the fine-grained update state visible in snapshots.
				progress.set_status_str(row.status.as_str(), row.status.is_terminal());
				Ok(progress)
			}
		}
	}

	fn instance_gate(&self, instance_id: i64) -> Arc<Semaphore> {
		let mut shared = self.shared.lock().unwrap();
		Arc::clone(
			shared
				.gates
				.entry(instance_id)
				.or_insert_with(|| Arc::new(Semaphore::new(self.per_instance_limit))),
		)
	}

	fn update_lock(&self, instance_id: i64) -> Arc<tokio::sync::Mutex<()>> {
		let mut shared = self.shared.lock().unwrap();
		Arc::clone(
			shared
				.update_locks
				.entry(instance_id)
				.or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
		)
	}

	/// Drops per-instance primitives nobody is waiting on anymore.
	fn release_instance_entries(&self, instance_id: i64) {
		let mut shared = self.shared.lock().unwrap();
		if shared
			.gates
			.get(&instance_id)
			.is_some_and(|sem| Arc::strong_count(sem) == 1)
		{
			shared.gates.remove(&instance_id);
		}
		if shared
			.update_locks
			.get(&instance_id)
			.is_some_and(|lock| Arc::strong_count(lock) == 1)
		{
			shared.update_locks.remove(&instance_id);
		}
	}

	fn forget_cancel(&self, job_id: JobId) {
		let mut shared = self.shared.lock().unwrap();
		shared.cancels.remove(&job_id);
	}

	#[instrument(skip(self), fields(job_id = %JobId::Sync(id)))]
	async fn run_sync_job(self: Arc<Self>, id: i64) {
		let job_id = JobId::Sync(id);
		let token = self.cancel_token(job_id);
		let progress = self.progress_entry(job_id, JobStatus::Queued);

		let row = {
			let Ok(mut conn) = self.ctx.pool.get() else {
				error!("No database connection for job startup");
				return;
			};
			match db::sync_jobs::find_by_id(&mut conn, id) {
				Ok(Some(row)) if row.status == JobStatus::Queued => row,
				Ok(_) => {
					debug!("Job no longer queued, skipping");
					return;
				}
				Err(err) => {
					error!(error = %err, "Failed to load job row");
					return;
				}
			}
		};

		// Global gate first, instance gate second; released in reverse
		// by drop order at the end of this function.
		let global = Arc::clone(&self.global);
		let _global_permit = tokio::select! {
			permit = global.acquire_owned() => permit.expect("global semaphore closed"),
			_ = token.cancelled() => {
				self.finish_sync(&progress, id, JobStatus::Canceled, None);
				return;
			}
		};
		let gate = self.instance_gate(row.instance_id);
		let _gate_permit = tokio::select! {
			permit = Arc::clone(&gate).acquire_owned() => permit.expect("instance gate closed"),
			_ = token.cancelled() => {
				self.finish_sync(&progress, id, JobStatus::Canceled, None);
				self.release_instance_entries(row.instance_id);
				return;
			}
		};

		self.active.fetch_add(1, Ordering::Relaxed);
		self.note_queue_depth();

		let result = self.sync_job_body(&row, &progress, &token).await;
		match result {
			Ok(()) => self.finish_sync(&progress, id, JobStatus::Succeeded, None),
			Err(err) if err.is_canceled() => {
				self.finish_sync(&progress, id, JobStatus::Canceled, None)
			}
			Err(err) => {
				warn!(error = %err, "Sync job failed");
				self.finish_sync(&progress, id, JobStatus::Failed, Some(err.to_string()));
			}
		}

		self.active.fetch_sub(1, Ordering::Relaxed);
		self.forget_cancel(job_id);
		drop(_gate_permit);
		drop(gate);
		self.release_instance_entries(row.instance_id);
		self.note_queue_depth();
	}

	async fn sync_job_body(
		&self,
		row: &crate::domain::sync_job::SyncJob,
		progress: &Progress,
		token: &CancellationToken,
	) -> Result<()> {
		{
			let mut conn = self.ctx.pool.get()?;
			db::sync_jobs::mark_running(&mut conn, row.id)?;
		}
		progress.set_status(JobStatus::Running);

		let instance = {
			let mut conn = self.ctx.pool.get()?;
			db::instances::find_by_id(&mut conn, row.instance_id)?
				.ok_or_else(|| Error::not_found(format!("instance {} missing", row.instance_id)))?
		};
		let only = {
			let mut shared = self.shared.lock().unwrap();
			shared.only.remove(&row.id)
		};

		sync::perform(
			&self.ctx,
			&instance,
			&row.server_id,
			only.as_deref(),
			progress,
			token,
		)
		.await
		.map(|_| ())
	}

	/// Persists a terminal sync status, unless a shutdown hard-stop is in
	/// flight: those rows stay `running` and are requeued on restart.
	fn finish_sync(&self, progress: &Progress, id: i64, status: JobStatus, err: Option<String>) {
		if self.jobs_root.is_cancelled() && status == JobStatus::Canceled {
			return;
		}
		if let Ok(mut conn) = self.ctx.pool.get() {
			if let Err(persist_err) =
				db::sync_jobs::mark_finished(&mut conn, id, status, err.as_deref())
			{
				error!(error = %persist_err, "Failed to persist job status");
			}
		}
		progress.set_status(status);
	}

	#[instrument(skip(self), fields(job_id = %JobId::Update(id)))]
	async fn run_update_job(self: Arc<Self>, id: i64) {
		if let Err(err) = self.execute_update(id).await {
			if !err.is_canceled() {
				warn!(error = %err, "Update job failed");
			}
		}
	}

	/// Shared core of the worker path and the synchronous apply path.
	async fn execute_update(&self, id: i64) -> Result<UpdateOutcome> {
		let job_id = JobId::Update(id);
		let token = self.cancel_token(job_id);
		let progress = self.progress_entry(job_id, JobStatus::Queued);

		let row = {
			let mut conn = self.ctx.pool.get()?;
			db::mod_updates::get_by_id(&mut conn, id)?
		};
		if row.status != UpdateState::Queued {
			return Err(Error::conflict("update job is not queued"));
		}

		let instance_id = {
			let mut conn = self.ctx.pool.get()?;
			db::mods::find_by_id(&mut conn, row.mod_id)?
				.map(|m| m.instance_id)
				.ok_or_else(|| {
					let err = Error::not_found(format!("mod {} missing", row.mod_id));
					self.finish_update(&progress, id, UpdateState::Failed, Some(err.to_string()));
					err
				})?
		};

		let global = Arc::clone(&self.global);
		let _global_permit = tokio::select! {
			permit = global.acquire_owned() => permit.expect("global semaphore closed"),
			_ = token.cancelled() => {
				self.finish_update(&progress, id, UpdateState::Canceled, None);
				return Err(Error::canceled());
			}
		};
		let lock = self.update_lock(instance_id);
		let _lock_guard = tokio::select! {
			guard = Arc::clone(&lock).lock_owned() => guard,
			_ = token.cancelled() => {
				self.finish_update(&progress, id, UpdateState::Canceled, None);
				self.release_instance_entries(instance_id);
				return Err(Error::canceled());
			}
		};

		self.active.fetch_add(1, Ordering::Relaxed);
		{
			let mut conn = self.ctx.pool.get()?;
			db::mod_updates::set_state(&mut conn, id, UpdateState::Running, None)?;
		}
		progress.set_status_str(UpdateState::Running.as_str(), false);
		progress.push_event(
			"state",
			json!({"jobId": job_id.to_string(), "state": UpdateState::Running.as_str(), "details": serde_json::Value::Null}),
		);

		let result = update::perform(&self.ctx, &row, &progress, &token).await;
		let outcome = match result {
			Ok(outcome) => {
				// Success reasons travel in the event payload; the error
				// column only ever carries failure text or partial hints.
				let persisted_reason = match outcome.state {
					UpdateState::Succeeded => None,
					_ => outcome.reason.clone(),
				};
				self.finish_update(&progress, id, outcome.state, persisted_reason);
				match outcome.state {
					UpdateState::Succeeded => progress.push_event(
						"succeeded",
						json!({
							"jobId": job_id.to_string(),
							"modId": row.mod_id,
							"version": row.to_version,
							"reason": outcome.reason,
						}),
					),
					_ => progress.push_event(
						"state",
						json!({
							"jobId": job_id.to_string(),
							"state": outcome.state.as_str(),
							"details": outcome.reason,
						}),
					),
				}
				Ok(outcome)
			}
			Err(err) if err.is_canceled() => {
				self.finish_update(&progress, id, UpdateState::Canceled, None);
				progress.push_event(
					"state",
					json!({"jobId": job_id.to_string(), "state": "canceled", "details": serde_json::Value::Null}),
				);
				Err(err)
			}
			Err(err) => {
				self.finish_update(&progress, id, UpdateState::Failed, Some(err.to_string()));
				progress.push_event(
					"failed",
					json!({"jobId": job_id.to_string(), "error": err.to_string()}),
				);
				Err(err)
			}
		};

		self.active.fetch_sub(1, Ordering::Relaxed);
		self.forget_cancel(job_id);
		drop(_lock_guard);
		drop(lock);
		self.release_instance_entries(instance_id);
		outcome
	}

	fn finish_update(
		&self,
		progress: &Progress,
		id: i64,
		state: UpdateState,
		reason: Option<String>,
	) {
		if self.jobs_root.is_cancelled() && state == UpdateState::Canceled {
			return;
		}
		if let Ok(mut conn) = self.ctx.pool.get() {
			if let Err(err) = db::mod_updates::set_state(&mut conn, id, state, reason.as_deref()) {
				error!(error = %err, "Failed to persist update state");
			}
		}
		progress.set_status_str(state.as_str(), state.is_terminal());
	}
}

fn coarse_status(state: UpdateState) -> JobStatus {
	match state {
		UpdateState::Queued => JobStatus::Queued,
		UpdateState::Succeeded => JobStatus::Succeeded,
		UpdateState::Failed | UpdateState::PartialSuccess => JobStatus::Failed,
		UpdateState::Canceled => JobStatus::Canceled,
		_ => JobStatus::Running,
	}
}

/// Owns the queue receivers; the long-lived worker loop.
pub struct EngineRunner {
	engine: Arc<Engine>,
	sync_rx: mpsc::Receiver<i64>,
	update_rx: mpsc::Receiver<i64>,
}

impl EngineRunner {
	/// Reads job ids and spawns one task per job until the engine's root
	/// token fires, then drains in-flight work bounded by the shutdown
	/// grace. Jobs still running after the deadline are hard-stopped and
	/// their rows reset to queued for the next process.
	pub async fn run(mut self) {
		info!("Job scheduler started");
		let mut tasks = JoinSet::new();
		loop {
			tokio::select! {
				biased;
				_ = self.engine.root.cancelled() => break,
				maybe_id = self.sync_rx.recv() => match maybe_id {
					Some(id) => {
						let engine = Arc::clone(&self.engine);
						tasks.spawn(engine.run_sync_job(id));
					}
					None => break,
				},
				maybe_id = self.update_rx.recv() => match maybe_id {
					Some(id) => {
						let engine = Arc::clone(&self.engine);
						tasks.spawn(engine.run_update_job(id));
					}
					None => break,
				},
			}
		}

		info!(in_flight = tasks.len(), "Job scheduler draining");
		let grace = self.engine.shutdown_grace;
		let drained = tokio::time::timeout(grace, async {
			while tasks.join_next().await.is_some() {}
		})
		.await;
		if drained.is_err() {
			warn!("Shutdown grace elapsed, hard-stopping remaining jobs");
			self.engine.jobs_root.cancel();
			let _ = tokio::time::timeout(Duration::from_secs(2), async {
				while tasks.join_next().await.is_some() {}
			})
			.await;
		}

		if let Ok(mut conn) = self.engine.ctx.pool.get() {
			let _ = db::sync_jobs::reset_running_to_queued(&mut conn);
			let _ = db::mod_updates::reset_running_to_queued(&mut conn);
		}
		info!("Job scheduler stopped");
	}
}
