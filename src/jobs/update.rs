//! Two-phase update executor.
//!
//! Downloads the target artifact, uploads it next to the old one,
//! verifies the upload by size, removes the old file, verifies the
//! removal and only then commits the new version to the store. When the
//! new file is verified but the old one cannot be removed, the job ends
//! in partial success and the store is left untouched.

use std::time::Instant;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::db;
use crate::domain::event::NewEvent;
use crate::domain::mod_entry::ModChanges;
use crate::domain::update_job::{UpdateJob, UpdateState};
use crate::domain::version::is_newer;
use crate::jarscan;
use crate::jobs::progress::Progress;
use crate::jobs::retry::retry_transient;
use crate::jobs::{ExecutorContext, JobId};
use crate::{Error, Result};

/// Terminal result of a successful executor run. Failure and
/// cancellation travel as errors and are persisted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub state: UpdateState,
    pub reason: Option<String>,
}

impl UpdateOutcome {
    fn succeeded(reason: Option<&str>) -> Self {
        Self {
            state: UpdateState::Succeeded,
            reason: reason.map(str::to_string),
        }
    }

    fn partial(hint: String) -> Self {
        Self {
            state: UpdateState::PartialSuccess,
            reason: Some(hint),
        }
    }
}

struct Step<'a> {
    ctx: &'a ExecutorContext,
    progress: &'a Progress,
    job_id: JobId,
}

impl Step<'_> {
    /// Persists a non-terminal transition and emits the SSE-shaped
    /// "state" event.
    fn advance(&self, job: &UpdateJob, state: UpdateState, details: serde_json::Value) -> Result<()> {
        let mut conn = self.ctx.pool.get()?;
        db::mod_updates::set_state(&mut conn, job.id, state, None)?;
        self.progress.set_status_str(state.as_str(), false);
        self.progress.push_event(
            "state",
            json!({"jobId": self.job_id.to_string(), "state": state.as_str(), "details": details}),
        );
        Ok(())
    }
}

/// Runs the update state machine for one job. The engine has already
/// moved the row to `Running` and holds the per-instance update lock.
#[instrument(skip_all, fields(job_id = %JobId::Update(job.id), mod_id = job.mod_id))]
pub async fn perform(
    ctx: &ExecutorContext,
    job: &UpdateJob,
    progress: &Progress,
    token: &CancellationToken,
) -> Result<UpdateOutcome> {
    let step = Step {
        ctx,
        progress,
        job_id: JobId::Update(job.id),
    };

    // Step 1: load the mod and refuse no-op updates.
    let mut conn = ctx.pool.get()?;
    let entry = db::mods::find_by_id(&mut conn, job.mod_id)?
        .ok_or_else(|| Error::not_found(format!("mod {} missing", job.mod_id)))?;
    let instance = db::instances::get_by_id(&mut conn, entry.instance_id)?;
    drop(conn);

    let slug = entry
        .slug()
        .ok_or_else(|| Error::bad_request("mod has no catalog slug"))?
        .to_string();
    let target = if job.to_version.is_empty() {
        entry.available_version.clone()
    } else {
        job.to_version.clone()
    };
    if target.is_empty() || target == entry.current_version {
        return Err(Error::conflict("no newer version available"));
    }

    // Step 2: find the target version and its artifact.
    let started = Instant::now();
    let (versions, attempts) =
        retry_transient(token, || ctx.catalog.versions(&slug, "", "")).await?;
    let version = versions
        .iter()
        .find(|v| v.version_number == target)
        .ok_or_else(|| Error::not_found(format!("version {target} not found for {slug}")))?;
    let file_url = version
        .primary_file()
        .map(|f| f.url.clone())
        .ok_or_else(|| Error::bad_request(format!("version {target} has no files")))?;
    log_step("select_version", started, attempts, None, None);

    // Step 3: file names and folder.
    let new_name = file_url
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{slug}-{target}.jar"));
    let folder = crate::domain::loader::Loader::parse(&entry.loader)
        .or_else(|| instance.parsed_loader())
        .map(|l| l.folder())
        .unwrap_or("mods");
    let new_path = format!("{folder}/{new_name}");

    // Step 4: plan against the current folder contents.
    let started = Instant::now();
    let (entries, attempts) =
        retry_transient(token, || ctx.remote.list_path(&instance.pufferpanel_server_id, folder))
            .await?;
    let plan = plan_installed(&entries.iter().map(|e| e.name.clone()).collect::<Vec<_>>(), &slug);
    if plan.file.is_some() {
        let mut conn = ctx.pool.get()?;
        let changes = ModChanges {
            installed_file: plan.file.clone(),
            installed_version: plan.version.clone().or(Some(String::new())),
            ..ModChanges::default()
        };
        db::mods::update(&mut conn, entry.id, &changes)?;
    }
    let old_name = plan.file.clone();
    let old_path = old_name.as_ref().map(|n| format!("{folder}/{n}"));
    log_step("plan", started, attempts, old_path.as_deref(), Some(&new_path));

    // Step 5: short-circuit when the installed version is already
    // at least the target.
    if let Some(installed) = plan.version.as_deref()
        && !is_newer(&target, installed)
    {
        info!(installed, target = %target, "Installed version already current");
        return Ok(UpdateOutcome::succeeded(Some("already_current")));
    }

    // Step 6: in-place overwrite needs the old size for comparison.
    let mut old_size: Option<usize> = None;
    if old_name.as_deref() == Some(new_name.as_str()) {
        let started = Instant::now();
        let (bytes, attempts) =
            retry_transient(token, || ctx.remote.fetch_file(&instance.pufferpanel_server_id, &new_path))
                .await?;
        old_size = Some(bytes.len());
        log_step("presize", started, attempts, Some(&new_path), None);
    }

    // Step 7: download the target artifact.
    let started = Instant::now();
    let (bytes, attempts) = retry_transient(token, || ctx.catalog.fetch_url(&file_url)).await?;
    let expected_size = bytes.len();
    log_step("download", started, attempts, None, Some(&new_path));

    // Step 8: upload and verify by presence and size.
    step.advance(job, UpdateState::UploadingNew, json!({"file": new_name}))?;
    let started = Instant::now();
    let upload = bytes.clone();
    let (_, attempts) = retry_transient(token, || {
        ctx.remote
            .put_file(&instance.pufferpanel_server_id, &new_path, upload.clone())
    })
    .await?;
    log_step("upload", started, attempts, None, Some(&new_path));

    step.advance(job, UpdateState::VerifyingNew, json!({"file": new_name}))?;
    let started = Instant::now();
    let (listing, attempts) =
        retry_transient(token, || ctx.remote.list_path(&instance.pufferpanel_server_id, folder))
            .await?;
    if !listing.iter().any(|e| e.name == new_name) {
        return Err(Error::bad_gateway(format!(
            "uploaded file {new_name} missing from listing"
        )));
    }
    let (uploaded, _) =
        retry_transient(token, || ctx.remote.fetch_file(&instance.pufferpanel_server_id, &new_path))
            .await?;
    if uploaded.len() != expected_size {
        return Err(Error::bad_gateway(format!(
            "size mismatch after upload: expected {expected_size}, found {}",
            uploaded.len()
        )));
    }
    log_step("verify_upload", started, attempts, None, Some(&new_path));

    // Steps 9/10: same-filename overwrites never delete; distinct names
    // remove the old artifact and verify it is gone.
    if old_name.as_deref() == Some(new_name.as_str()) {
        if old_size == Some(expected_size) {
            info!(file = %new_name, "Server already had the artifact");
            return Ok(UpdateOutcome::succeeded(Some("already_current")));
        }
    } else if let Some(old_name) = &old_name {
        let old_path = format!("{folder}/{old_name}");
        step.advance(job, UpdateState::RemovingOld, json!({"file": old_name}))?;
        let started = Instant::now();
        let (_, attempts) = retry_transient(token, || {
            ctx.remote
                .delete_file(&instance.pufferpanel_server_id, &old_path)
        })
        .await?;
        log_step("remove_old", started, attempts, Some(&old_path), Some(&new_path));

        step.advance(job, UpdateState::VerifyingRemoval, json!({"file": old_name}))?;
        let (listing, _) = retry_transient(token, || {
            ctx.remote.list_path(&instance.pufferpanel_server_id, folder)
        })
        .await?;
        if listing.iter().any(|e| e.name == *old_name) {
            let hint = format!(
                "new file {new_name} uploaded and verified, but old file {old_name} is still present; remove it manually and re-sync"
            );
            return Ok(UpdateOutcome::partial(hint));
        }
    }

    // Step 11: commit the new version.
    step.advance(job, UpdateState::UpdatingDb, json!({"version": target}))?;
    let mut conn = ctx.pool.get()?;
    let changes = ModChanges {
        current_version: Some(target.clone()),
        channel: Some(version.channel()),
        download_url: Some(file_url.clone()),
        installed_file: Some(new_name.clone()),
        installed_version: Some(target.clone()),
        ..ModChanges::default()
    };
    let updated = db::mods::update(&mut conn, entry.id, &changes)?;
    db::events::insert(
        &mut conn,
        NewEvent::updated(
            instance.id,
            entry.id,
            &updated.name,
            &entry.current_version,
            &target,
        ),
    )?;

    info!(mod_id = entry.id, version = %target, "Completed update successfully");
    Ok(UpdateOutcome::succeeded(None))
}

struct InstalledPlan {
    file: Option<String>,
    version: Option<String>,
}

/// Finds the jar in the folder that appears to belong to the given slug
/// and, when parseable, its installed version.
fn plan_installed(files: &[String], slug: &str) -> InstalledPlan {
    for file in files {
        if !file.to_lowercase().ends_with(".jar") {
            continue;
        }
        let parsed = jarscan::parse_filename(file);
        let slug_head = slug.split('-').next().unwrap_or(slug);
        let matches = parsed
            .slug
            .as_deref()
            .is_some_and(|s| crate::domain::version::normalize_candidate(s) == slug)
            || parsed.id().is_some_and(|id| id == slug_head);
        if matches {
            return InstalledPlan {
                file: Some(file.clone()),
                version: parsed.version,
            };
        }
    }
    InstalledPlan {
        file: None,
        version: None,
    }
}

fn log_step(step: &str, started: Instant, attempts: u32, old: Option<&str>, new: Option<&str>) {
    debug!(
        step,
        duration_ms = started.elapsed().as_millis() as u64,
        attempts,
        old_path = old.unwrap_or(""),
        new_path = new.unwrap_or(""),
        "Update step finished"
    );
}
