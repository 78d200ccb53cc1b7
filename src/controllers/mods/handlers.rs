use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, debug_handler};
use tracing::{debug, info, instrument, warn};

use crate::clients::modrinth::pick_available;
use crate::controllers::ensure_loader_not_required;
use crate::controllers::mods::models::{
    CheckBody, MetadataBody, MetadataPayload, ModBody, ModDeleteParams, ModListBody,
    ModListParams, NewModPayload, UpdateAsyncBody, UpdateAsyncPayload, UpdateModPayload,
};
use crate::db;
use crate::domain::app_state::{AppPool, AppState};
use crate::domain::event::NewEvent;
use crate::domain::instance::Instance;
use crate::domain::mod_entry::{Mod, ModChanges, ModKey, NewMod, canonical_url};
use crate::{Error, Result};

#[instrument(skip(pool))]
#[debug_handler(state = AppState)]
pub(super) async fn get_mods(
    State(pool): State<AppPool>,
    Query(params): Query<ModListParams>,
) -> Result<Json<ModListBody>> {
    debug!("Starting fetch mods");
    let mut conn = pool.get()?;
    let rows = db::mods::list_by_instance(&mut conn, params.instance_id)?;
    let count = rows.len();
    let response: ModListBody = rows.into_iter().map(ModBody::from).collect();
    info!(count, "Completed fetch mods successfully");
    Ok(Json(response))
}

/// Extracts the catalog slug from a canonical project URL or accepts a
/// bare slug.
fn slug_from_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::bad_request("url must not be empty"));
    }
    if let Some((_, slug)) = trimmed.rsplit_once("/mod/") {
        if slug.is_empty() || slug.contains('/') {
            return Err(Error::bad_request(format!("not a catalog project url: {url}")));
        }
        return Ok(slug.to_string());
    }
    if trimmed.contains('/') {
        return Err(Error::bad_request(format!("not a catalog project url: {url}")));
    }
    Ok(trimmed.to_string())
}

#[instrument(skip(state, payload))]
#[debug_handler(state = AppState)]
pub(super) async fn mod_metadata(
    state: AppState,
    Json(payload): Json<MetadataPayload>,
) -> Result<Json<MetadataBody>> {
    let slug = slug_from_url(&payload.url)?;
    let project = state.catalog.resolve(&slug).await.map_err(Error::from)?;
    let versions = state
        .catalog
        .versions(&project.slug, "", "")
        .await
        .map_err(Error::from)?;
    Ok(Json(MetadataBody::from_catalog(project, &versions)))
}

fn load_instance(pool: &AppPool, instance_id: i64) -> Result<Instance> {
    let mut conn = pool.get()?;
    db::instances::find_by_id(&mut conn, instance_id)?
        .ok_or_else(|| Error::not_found(format!("instance {instance_id}")))
}

fn load_mod(pool: &AppPool, mod_id: ModKey) -> Result<Mod> {
    let mut conn = pool.get()?;
    db::mods::find_by_id(&mut conn, mod_id)?
        .ok_or_else(|| Error::not_found(format!("mod {mod_id}")))
}

#[instrument(skip(state, payload), fields(instance_id = payload.instance_id))]
#[debug_handler(state = AppState)]
pub(super) async fn create_mod(
    state: AppState,
    Json(payload): Json<NewModPayload>,
) -> Result<(StatusCode, Json<ModBody>)> {
    debug!("Starting mod creation");
    let start = Instant::now();

    let instance = load_instance(&state.db_pool, payload.instance_id)?;
    ensure_loader_not_required(&instance, "create_mod")?;

    let slug = slug_from_url(&payload.url)?;
    let project = state.catalog.resolve(&slug).await.map_err(Error::from)?;
    let versions = state
        .catalog
        .versions(&project.slug, "", "")
        .await
        .map_err(Error::from)?;

    let channel = payload.channel.unwrap_or_default();
    let chosen = match &payload.version_id {
        Some(version_id) => versions
            .iter()
            .find(|v| v.id == *version_id)
            .ok_or_else(|| Error::bad_request(format!("version {version_id} not found")))?,
        None => pick_available(&versions, channel)
            .ok_or_else(|| Error::bad_request("project has no eligible versions"))?,
    };

    // Loader mismatches warn rather than reject; the user may know
    // better than the catalog's tags.
    if let Some(instance_loader) = instance.parsed_loader()
        && instance_loader.is_catalog_loader()
        && !chosen.loaders.iter().any(|l| l == instance_loader.id())
    {
        warn!(
            instance_loader = instance_loader.id(),
            version_loaders = ?chosen.loaders,
            "Selected version does not list the instance loader"
        );
    }

    let available = pick_available(&versions, channel);
    let (available_version, available_channel) = match available {
        Some(v) => (v.version_number.clone(), v.channel().as_str().to_string()),
        None => (chosen.version_number.clone(), chosen.channel().as_str().to_string()),
    };

    let mut conn = state.db_pool.get()?;
    let url = canonical_url(&project.slug);
    if db::mods::find_by_url(&mut conn, instance.id, &url)?.is_some() {
        return Err(Error::conflict(format!("{} is already tracked", project.slug)));
    }
    let row = db::mods::create(
        &mut conn,
        NewMod {
            instance_id: instance.id,
            name: if project.title.is_empty() {
                project.slug.clone()
            } else {
                project.title.clone()
            },
            icon_url: project.icon_url.clone().unwrap_or_default(),
            url,
            game_version: instance.game_version.clone(),
            loader: chosen.pick_loader(instance.parsed_loader(), None),
            channel,
            current_version: chosen.version_number.clone(),
            available_version,
            available_channel,
            download_url: chosen.primary_file().map(|f| f.url.clone()).unwrap_or_default(),
            installed_file: String::new(),
            installed_version: String::new(),
            created_at: chrono::Utc::now(),
        },
    )?;
    db::events::insert(
        &mut conn,
        NewEvent::added(instance.id, row.id, &row.name, &row.current_version),
    )?;

    info!(
        mod_id = row.id,
        name = %row.name,
        duration_ms = start.elapsed().as_millis() as u64,
        "Completed mod creation successfully"
    );
    Ok((StatusCode::CREATED, Json(row.into())))
}

/// Dry-run refresh of the available version. No writes.
#[instrument(skip(state), fields(mod_id = ?mod_id))]
#[debug_handler(state = AppState)]
pub(super) async fn check_mod(
    state: AppState,
    Path(mod_id): Path<ModKey>,
) -> Result<Json<CheckBody>> {
    let entry = load_mod(&state.db_pool, mod_id)?;
    let instance = load_instance(&state.db_pool, entry.instance_id)?;
    ensure_loader_not_required(&instance, "check_for_updates")?;

    let slug = entry
        .slug()
        .ok_or_else(|| Error::bad_request("mod has no catalog slug"))?;
    let versions = state
        .catalog
        .versions(slug, "", "")
        .await
        .map_err(Error::from)?;
    let (available_version, available_channel) = match pick_available(&versions, entry.channel) {
        Some(v) => (v.version_number.clone(), v.channel().as_str().to_string()),
        None => (entry.current_version.clone(), entry.available_channel.clone()),
    };
    Ok(Json(CheckBody {
        up_to_date: available_version == entry.current_version,
        current_version: entry.current_version,
        available_version,
        available_channel,
    }))
}

#[instrument(skip(state, payload), fields(mod_id = ?mod_id))]
#[debug_handler(state = AppState)]
pub(super) async fn update_mod(
    state: AppState,
    Path(mod_id): Path<ModKey>,
    Json(payload): Json<UpdateModPayload>,
) -> Result<Json<ModBody>> {
    let entry = load_mod(&state.db_pool, mod_id)?;
    let instance = load_instance(&state.db_pool, entry.instance_id)?;
    ensure_loader_not_required(&instance, "update_mod_metadata")?;

    let mut changes = ModChanges {
        name: payload.name,
        game_version: payload.game_version,
        loader: payload.loader,
        channel: payload.channel,
        ..ModChanges::default()
    };

    // A channel change shifts which versions are eligible, so the
    // available version is recomputed right away.
    if let Some(channel) = payload.channel
        && channel != entry.channel
        && let Some(slug) = entry.slug()
    {
        let versions = state
            .catalog
            .versions(slug, "", "")
            .await
            .map_err(Error::from)?;
        if let Some(v) = pick_available(&versions, channel) {
            changes.available_version = Some(v.version_number.clone());
            changes.available_channel = Some(v.channel().as_str().to_string());
        }
    }

    let mut conn = state.db_pool.get()?;
    let updated = if changes.is_empty() {
        entry
    } else {
        db::mods::update(&mut conn, mod_id, &changes)?
    };
    info!(mod_id, "Completed mod update successfully");
    Ok(Json(updated.into()))
}

/// Applies the available version synchronously and returns the
/// refreshed mod.
#[instrument(skip(state), fields(mod_id = ?mod_id))]
#[debug_handler(state = AppState)]
pub(super) async fn apply_update(
    state: AppState,
    Path(mod_id): Path<ModKey>,
) -> Result<Json<ModBody>> {
    let entry = load_mod(&state.db_pool, mod_id)?;
    let instance = load_instance(&state.db_pool, entry.instance_id)?;
    ensure_loader_not_required(&instance, "apply_update")?;

    if entry.available_version.is_empty() || entry.is_up_to_date() {
        return Err(Error::conflict("no newer version available"));
    }

    let start = Instant::now();
    let updated = state.engine.run_update_inline(&entry).await?;
    info!(
        mod_id,
        version = %updated.current_version,
        duration_ms = start.elapsed().as_millis() as u64,
        "Completed synchronous update successfully"
    );
    Ok(Json(updated.into()))
}

#[instrument(skip(state, payload), fields(mod_id = ?mod_id))]
#[debug_handler(state = AppState)]
pub(super) async fn update_async(
    state: AppState,
    Path(mod_id): Path<ModKey>,
    Json(payload): Json<UpdateAsyncPayload>,
) -> Result<Json<UpdateAsyncBody>> {
    let entry = load_mod(&state.db_pool, mod_id)?;
    let instance = load_instance(&state.db_pool, entry.instance_id)?;
    ensure_loader_not_required(&instance, "enqueue_update")?;

    if payload.idempotency_key.is_empty() {
        return Err(Error::bad_request("idempotency_key must not be empty"));
    }
    if entry.available_version.is_empty() || entry.is_up_to_date() {
        return Err(Error::conflict("no newer version available"));
    }

    let job_id = state
        .engine
        .enqueue_update(&entry, payload.idempotency_key)
        .await?;
    Ok(Json(UpdateAsyncBody { job_id }))
}

#[instrument(skip(state), fields(mod_id = ?mod_id))]
#[debug_handler(state = AppState)]
pub(super) async fn delete_mod(
    state: AppState,
    Path(mod_id): Path<ModKey>,
    Query(params): Query<ModDeleteParams>,
) -> Result<StatusCode> {
    let entry = load_mod(&state.db_pool, mod_id)?;
    if let Some(instance_id) = params.instance_id
        && instance_id != entry.instance_id
    {
        return Err(Error::bad_request("mod does not belong to that instance"));
    }
    let instance = load_instance(&state.db_pool, entry.instance_id)?;
    ensure_loader_not_required(&instance, "delete_mod")?;

    let mut conn = state.db_pool.get()?;
    db::events::insert(
        &mut conn,
        NewEvent::deleted(entry.instance_id, entry.id, &entry.name, &entry.current_version),
    )?;
    let count = db::mods::delete(&mut conn, mod_id)?;
    info!(mod_id, count, "Completed mod deletion successfully");
    Ok(StatusCode::NO_CONTENT)
}
