use std::collections::BTreeMap;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, debug_handler};
use tracing::{debug, info, instrument, warn};

use crate::controllers::instances::models::{
    DeleteInstanceParams, EnqueuedBody, InstanceBody, InstanceListBody, NewInstancePayload,
    SyncAllBody, SyncRequestPayload, UpdateInstancePayload, ValidationOkBody,
};
use crate::db;
use crate::domain::app_state::{AppPool, AppState};
use crate::domain::instance::{InstanceChanges, InstanceKey, InstanceName, LoaderSource, NewInstance};
use crate::domain::loader::Loader;
use crate::domain::sync_job::JobStatus;
use crate::{Error, Result};

#[instrument(skip(pool))]
#[debug_handler(state = AppState)]
pub(super) async fn get_instances(State(pool): State<AppPool>) -> Result<Json<InstanceListBody>> {
    debug!("Starting fetch all instances");
    let mut conn = pool.get()?;
    let rows = db::instances::get_all(&mut conn)?;
    let mut response = Vec::with_capacity(rows.len());
    for instance in rows {
        let stats = db::mods::stats(&mut conn, instance.id)?;
        response.push(InstanceBody::from_parts(instance, stats));
    }
    info!(count = response.len(), "Completed fetch all instances successfully");
    Ok(Json(response))
}

#[instrument(skip(pool), fields(instance_id = ?instance_id))]
#[debug_handler(state = AppState)]
pub(super) async fn get_instance_by_id(
    State(pool): State<AppPool>,
    Path(instance_id): Path<InstanceKey>,
) -> Result<Json<InstanceBody>> {
    let mut conn = pool.get()?;
    let instance = db::instances::find_by_id(&mut conn, instance_id)?
        .ok_or_else(|| Error::not_found(format!("instance {instance_id}")))?;
    let stats = db::mods::stats(&mut conn, instance_id)?;
    Ok(Json(InstanceBody::from_parts(instance, stats)))
}

/// Field-level validation shared by the validate endpoint and create.
async fn validation_details(
    state: &AppState,
    payload: &NewInstancePayload,
    server_required: bool,
) -> BTreeMap<String, String> {
    let mut details = BTreeMap::new();

    if let Some(name) = &payload.name
        && let Err(err) = InstanceName::parse(name, state.settings.instance_name_max_graphemes)
    {
        details.insert("name".to_string(), err.to_string());
    }
    if let Some(loader) = &payload.loader
        && !loader.is_empty()
        && Loader::parse(loader).is_none()
    {
        details.insert("loader".to_string(), "unrecognized loader".to_string());
    }
    match &payload.server_id {
        Some(server_id) if !server_id.is_empty() => {
            if let Err(err) = state.remote.get_server(server_id).await {
                details.insert("serverId".to_string(), err.to_string());
            }
        }
        _ if server_required => {
            details.insert("serverId".to_string(), "server id is required".to_string());
        }
        _ => {}
    }
    details
}

#[instrument(skip(state, payload))]
#[debug_handler(state = AppState)]
pub(super) async fn validate_instance(
    state: AppState,
    Json(payload): Json<NewInstancePayload>,
) -> Result<Json<ValidationOkBody>> {
    let details = validation_details(&state, &payload, false).await;
    if details.is_empty() {
        Ok(Json(ValidationOkBody { ok: true }))
    } else {
        Err(Error::validation(details))
    }
}

#[instrument(skip(state, payload), fields(server_id = ?payload.server_id))]
#[debug_handler(state = AppState)]
pub(super) async fn create_instance(
    state: AppState,
    Json(payload): Json<NewInstancePayload>,
) -> Result<(StatusCode, Json<InstanceBody>)> {
    debug!("Starting instance creation");
    let start = Instant::now();

    let details = validation_details(&state, &payload, true).await;
    if !details.is_empty() {
        warn!(?details, "Instance validation failed");
        return Err(Error::validation(details));
    }
    let server_id = payload.server_id.clone().unwrap_or_default();

    // Name falls back to whatever the remote calls the server.
    let cap = state.settings.instance_name_max_graphemes;
    let name = match &payload.name {
        Some(name) => InstanceName::parse(name, cap)?,
        None => {
            let server = state.remote.get_server(&server_id).await.map_err(Error::from)?;
            InstanceName::truncated(&server.name, cap)?
        }
    };
    let loader = payload.loader.as_deref().and_then(Loader::parse);

    let mut conn = state.db_pool.get()?;
    let created = db::instances::create(&mut conn, NewInstance::new(name, loader, server_id))?;
    let stats = db::mods::stats(&mut conn, created.id)?;

    info!(
        instance_id = created.id,
        name = %created.name,
        duration_ms = start.elapsed().as_millis() as u64,
        "Completed instance creation successfully"
    );
    Ok((
        StatusCode::CREATED,
        Json(InstanceBody::from_parts(created, stats)),
    ))
}

#[instrument(skip(state, payload), fields(instance_id = ?instance_id))]
#[debug_handler(state = AppState)]
pub(super) async fn update_instance(
    state: AppState,
    Path(instance_id): Path<InstanceKey>,
    Json(payload): Json<UpdateInstancePayload>,
) -> Result<Json<InstanceBody>> {
    let cap = state.settings.instance_name_max_graphemes;
    let mut changes = InstanceChanges::default();

    if let Some(name) = payload.name {
        changes.name = Some(InstanceName::parse(&name, cap)?.into_inner());
    }
    if let Some(loader) = payload.loader {
        let parsed = Loader::parse(&loader)
            .ok_or_else(|| Error::bad_request(format!("unrecognized loader {loader}")))?;
        changes.loader = Some(parsed.id().to_string());
        changes.loader_source = Some(LoaderSource::User);
        // A user-chosen loader resolves the gate.
        changes.requires_loader = Some(false);
    }
    if let Some(game_version) = payload.game_version {
        // A manually pinned version detaches from the template variable.
        changes.game_version = Some(game_version);
        changes.puffer_version_key = Some(String::new());
    }

    let mut conn = state.db_pool.get()?;
    let current = db::instances::get_by_id(&mut conn, instance_id)
        .map_err(|_| Error::not_found(format!("instance {instance_id}")))?;
    let updated = if changes.is_empty() {
        current
    } else {
        db::instances::update(&mut conn, instance_id, &changes)?
    };
    let stats = db::mods::stats(&mut conn, instance_id)?;
    info!(instance_id, "Completed instance update successfully");
    Ok(Json(InstanceBody::from_parts(updated, stats)))
}

#[instrument(skip(pool), fields(instance_id = ?instance_id))]
#[debug_handler(state = AppState)]
pub(super) async fn delete_instance(
    State(pool): State<AppPool>,
    Path(instance_id): Path<InstanceKey>,
    Query(params): Query<DeleteInstanceParams>,
) -> Result<StatusCode> {
    let mut conn = pool.get()?;
    if db::instances::find_by_id(&mut conn, instance_id)?.is_none() {
        warn!(instance_id, "Attempted to delete non-existent instance");
        return Err(Error::not_found(format!("instance {instance_id}")));
    }

    if let Some(target) = params.target_instance_id {
        db::instances::get_by_id(&mut conn, target)
            .map_err(|_| Error::bad_request(format!("target instance {target} does not exist")))?;
        let moved = db::mods::reparent(&mut conn, instance_id, target)?;
        info!(instance_id, target, moved, "Reparented mods before deletion");
    }

    let count = db::instances::delete(&mut conn, instance_id)?;
    info!(instance_id, count, "Completed instance deletion successfully");
    Ok(StatusCode::NO_CONTENT)
}

/// Lists remote servers and auto-creates instances for any that are not
/// yet tracked. Remote names are truncated to the configured cap.
#[instrument(skip(state))]
#[debug_handler(state = AppState)]
pub(super) async fn sync_instances(state: AppState) -> Result<Json<SyncAllBody>> {
    let servers = state.remote.list_servers().await.map_err(Error::from)?;
    let cap = state.settings.instance_name_max_graphemes;

    let mut conn = state.db_pool.get()?;
    let mut created = 0;
    for server in &servers {
        if db::instances::find_by_server_id(&mut conn, &server.id)?.is_some() {
            continue;
        }
        let name = match InstanceName::truncated(&server.name, cap) {
            Ok(name) => name,
            Err(_) => InstanceName::parse(&server.id, cap)?,
        };
        db::instances::create(&mut conn, NewInstance::new(name, None, server.id.clone()))?;
        created += 1;
    }
    let total = db::instances::count(&mut conn)? as usize;
    info!(created, total, "Completed server discovery successfully");
    Ok(Json(SyncAllBody { created, total }))
}

#[instrument(skip(state, payload), fields(instance_id = ?instance_id))]
#[debug_handler(state = AppState)]
pub(super) async fn enqueue_sync(
    state: AppState,
    Path(instance_id): Path<InstanceKey>,
    payload: Option<Json<SyncRequestPayload>>,
) -> Result<Json<EnqueuedBody>> {
    let Json(payload) = payload.unwrap_or_default();
    let mut conn = state.db_pool.get()?;
    let instance = db::instances::find_by_id(&mut conn, instance_id)?
        .ok_or_else(|| Error::not_found(format!("instance {instance_id}")))?;
    drop(conn);

    let server_id = payload
        .server_id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| instance.pufferpanel_server_id.clone());
    if server_id.is_empty() {
        return Err(Error::bad_request("instance has no server binding"));
    }

    let (job_id, _completion) = state
        .engine
        .enqueue_sync(&instance, &server_id, payload.key)
        .await?;
    Ok(Json(EnqueuedBody {
        id: job_id,
        status: JobStatus::Queued.as_str().to_string(),
    }))
}

/// Deprecated alias for the sync endpoint, kept alive behind the
/// `ALLOW_RESYNC_ALIAS` flag.
#[instrument(skip(state, payload), fields(instance_id = ?instance_id))]
#[debug_handler(state = AppState)]
pub(super) async fn enqueue_resync(
    state: AppState,
    Path(instance_id): Path<InstanceKey>,
    payload: Option<Json<SyncRequestPayload>>,
) -> Result<Json<EnqueuedBody>> {
    if !state.settings.env.allow_resync_alias {
        return Err(Error::gone("resync was replaced by sync"));
    }
    enqueue_sync(state, Path(instance_id), payload).await
}
