//! One-pass reconciliation of remote server jars with stored mod rows.
//!
//! The pipeline: validate the server, detect loader and game version,
//! list the managed folder, identify every jar (filename heuristics,
//! deep scan, alias memoization, catalog resolution, search fallback),
//! upsert mod rows, then delete rows whose jars are gone. Single-file
//! failures are counted and recorded but never fail the job.

use std::collections::{HashMap, HashSet};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::clients::modrinth::{Project, SearchHit, Version, pick_available};
use crate::clients::pufferpanel::ServerDefinition;
use crate::db;
use crate::detect::game_version::detect_game_version;
use crate::detect::loader::{LoaderDetection, detect_loader};
use crate::domain::event::NewEvent;
use crate::domain::instance::{Instance, InstanceChanges, LoaderSource};
use crate::domain::loader::Loader;
use crate::domain::mod_entry::{Mod, ModChanges, NewMod, canonical_url};
use crate::domain::version::{normalize_candidate, normalize_version};
use crate::jarscan::{self, ArchiveMeta, alnum_tokens, jaccard};
use crate::jobs::progress::Progress;
use crate::jobs::retry::retry_transient;
use crate::jobs::ExecutorContext;
use crate::{Error, Result};

/// Minimum filename similarity for the search heuristic.
const SIMILARITY_FLOOR: f64 = 0.3;
/// Search hits examined before giving up on a file.
const SEARCH_HIT_CAP: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub unmatched: usize,
}

enum FileResult {
    Added,
    Updated,
    Unchanged,
}

/// Runs a full sync for one instance against one remote server.
///
/// `only` restricts processing to the given filenames (retry scope);
/// deletion reconciliation always considers the full remote listing.
#[instrument(skip_all, fields(instance_id = instance.id, server_id))]
pub async fn perform(
    ctx: &ExecutorContext,
    instance: &Instance,
    server_id: &str,
    only: Option<&[String]>,
    progress: &Progress,
    token: &CancellationToken,
) -> Result<SyncOutcome> {
    let (server, _) =
        retry_transient(token, || ctx.remote.get_server(server_id)).await?;
    debug!(server_name = %server.name, "Remote server validated");

    let mut instance = instance.clone();
    apply_loader_detection(ctx, &mut instance, server_id, token).await?;
    apply_game_version_detection(ctx, &mut instance, server_id, token).await?;

    let loader = instance
        .parsed_loader()
        .ok_or_else(Error::loader_required)?;
    let folder = loader.folder();

    let (entries, _) = retry_transient(token, || ctx.remote.list_path(server_id, folder))
        .await
        .map_err(|err| translate_folder_error(err, folder))?;
    let mut files: Vec<String> = entries
        .into_iter()
        .filter(|e| e.name.to_lowercase().ends_with(".jar"))
        .map(|e| e.name)
        .collect();
    files.sort();

    let mut conn = ctx.pool.get()?;
    let mut by_url: HashMap<String, Mod> = db::mods::list_by_instance(&mut conn, instance.id)?
        .into_iter()
        .map(|m| (m.url.clone(), m))
        .collect();
    drop(conn);
    let preexisting: Vec<Mod> = by_url.values().cloned().collect();

    let work: Vec<String> = match only {
        Some(names) => files
            .iter()
            .filter(|f| names.iter().any(|n| n == *f))
            .cloned()
            .collect(),
        None => files.clone(),
    };
    progress.set_total(work.len());

    let mut outcome = SyncOutcome::default();
    let mut touched: HashSet<String> = HashSet::new();
    for file in &work {
        if token.is_cancelled() {
            return Err(Error::canceled());
        }
        match process_file(
            ctx,
            &instance,
            server_id,
            folder,
            file,
            &mut by_url,
            &mut touched,
            token,
        )
        .await
        {
            Ok(FileResult::Added) => {
                outcome.added += 1;
                progress.success();
            }
            Ok(FileResult::Updated) => {
                outcome.updated += 1;
                progress.success();
            }
            Ok(FileResult::Unchanged) => progress.success(),
            Err(err) if err.is_canceled() => return Err(err),
            Err(err) => {
                warn!(file = %file, error = %err, "File could not be matched");
                outcome.unmatched += 1;
                progress.fail(file, &err.to_string());
            }
        }
    }

    outcome.removed = reconcile_deletions(ctx, &instance, &preexisting, &files, &touched)?;

    let mut conn = ctx.pool.get()?;
    db::instances::touch_last_sync(&mut conn, instance.id, chrono::Utc::now())?;

    info!(
        added = outcome.added,
        updated = outcome.updated,
        removed = outcome.removed,
        unmatched = outcome.unmatched,
        "Completed sync successfully"
    );
    Ok(outcome)
}

/// Loader detection and persistence per the gating rules: a detected
/// loader is stored and clears the gate; unknown keeps a previously set
/// loader; a conflict (or unknown without a prior loader) raises the
/// requires-loader gate and aborts with the 409 signal.
async fn apply_loader_detection(
    ctx: &ExecutorContext,
    instance: &mut Instance,
    server_id: &str,
    token: &CancellationToken,
) -> Result<()> {
    let raw = retry_transient(token, || ctx.remote.get_definition_raw(server_id))
        .await
        .ok()
        .map(|(v, _)| v);

    match detect_loader(raw.as_ref()) {
        LoaderDetection::Detected { loader, source } => {
            info!(loader = loader.id(), source = source.as_str(), "loader_autoset");
            if instance.loader != loader.id() || instance.requires_loader {
                let changes = InstanceChanges {
                    loader: Some(loader.id().to_string()),
                    loader_source: Some(LoaderSource::Detected),
                    requires_loader: Some(false),
                    ..InstanceChanges::default()
                };
                let mut conn = ctx.pool.get()?;
                *instance = db::instances::update(&mut conn, instance.id, &changes)?;
            }
        }
        LoaderDetection::Unknown { reasons } => {
            info!(?reasons, "loader_unknown");
            if instance.loader.is_empty() {
                raise_loader_gate(ctx, instance)?;
                return Err(Error::loader_required());
            }
        }
        LoaderDetection::Conflict { loaders } => {
            let ids: Vec<&str> = loaders.iter().map(|l| l.id()).collect();
            info!(reasons = ?["conflict"], conflicting = ?ids, "loader_unknown");
            raise_loader_gate(ctx, instance)?;
            return Err(Error::loader_required());
        }
    }
    Ok(())
}

fn raise_loader_gate(ctx: &ExecutorContext, instance: &mut Instance) -> Result<()> {
    if !instance.requires_loader {
        let changes = InstanceChanges {
            requires_loader: Some(true),
            ..InstanceChanges::default()
        };
        let mut conn = ctx.pool.get()?;
        *instance = db::instances::update(&mut conn, instance.id, &changes)?;
    }
    Ok(())
}

/// Game-version detection and persistence: same key updates the value,
/// a new key is only adopted while no version is stored, and a manually
/// set version (no key) is never overwritten.
async fn apply_game_version_detection(
    ctx: &ExecutorContext,
    instance: &mut Instance,
    server_id: &str,
    token: &CancellationToken,
) -> Result<()> {
    let definition: Option<ServerDefinition> =
        retry_transient(token, || ctx.remote.get_definition(server_id))
            .await
            .ok()
            .map(|(v, _)| v);
    let Some(definition) = definition else {
        return Ok(());
    };
    let data = ctx.remote.get_data(server_id).await.ok();

    let Some(candidate) = detect_game_version(&definition, data.as_ref()) else {
        return Ok(());
    };

    let mut changes = InstanceChanges::default();
    if instance.puffer_version_key == candidate.key {
        if instance.game_version != candidate.value {
            changes.game_version = Some(candidate.value.clone());
        }
    } else if instance.game_version.is_empty() {
        changes.puffer_version_key = Some(candidate.key.clone());
        changes.game_version = Some(candidate.value.clone());
    } else if instance.puffer_version_key.is_empty() {
        // Manually pinned version; leave it alone.
        return Ok(());
    }

    if changes.game_version.is_some() || changes.puffer_version_key.is_some() {
        debug!(key = %candidate.key, value = %candidate.value, "Game version detected");
        let mut conn = ctx.pool.get()?;
        *instance = db::instances::update(&mut conn, instance.id, &changes)?;
    }
    Ok(())
}

fn translate_folder_error(err: Error, folder: &str) -> Error {
    if err.kind() == crate::ErrorKind::NotFound {
        Error::not_found(format!("{folder} folder missing"))
    } else {
        err
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_file(
    ctx: &ExecutorContext,
    instance: &Instance,
    server_id: &str,
    folder: &str,
    file: &str,
    by_url: &mut HashMap<String, Mod>,
    touched: &mut HashSet<String>,
    token: &CancellationToken,
) -> Result<FileResult> {
    let parsed = jarscan::parse_filename(file);
    let mut slug_guess = parsed.slug.clone();
    let mut version_guess = parsed.version.clone();
    let mut deep: Option<ArchiveMeta> = None;

    // The filename alone is often enough; fetch bytes only when slug or
    // version is missing.
    if slug_guess.is_none() || version_guess.is_none() {
        deep = fetch_and_scan(ctx, server_id, folder, file, token).await?;
        if let Some(meta) = &deep {
            if meta.slug.is_some() {
                slug_guess = meta.slug.clone();
            }
            if meta.version.is_some() {
                version_guess = meta.version.clone();
            }
        }
    }

    let stem = file.trim_end_matches(".jar");
    let candidate = normalize_candidate(slug_guess.as_deref().unwrap_or(stem));

    // Learned aliases short-circuit resolution.
    let alias = {
        let mut conn = ctx.pool.get()?;
        db::aliases::find(&mut conn, instance.id, &candidate)?
    };

    let mut project: Option<Project> = match alias {
        Some(slug) => resolve_candidate(ctx, &slug, token).await?,
        None => None,
    };
    if project.is_none() {
        project = resolve_candidate(ctx, &candidate, token).await?;
    }
    if project.is_none() && deep.is_none() {
        // Resolution failed on filename identity alone; the manifest may
        // know the real id.
        deep = fetch_and_scan(ctx, server_id, folder, file, token).await?;
        if let Some(meta) = &deep {
            if meta.version.is_some() && version_guess.is_none() {
                version_guess = meta.version.clone();
            }
            if let Some(slug) = &meta.slug {
                project = resolve_candidate(ctx, &normalize_candidate(slug), token).await?;
            }
        }
    }

    let derived_loader = parsed.loader.or(deep.as_ref().and_then(|m| m.loader));

    let mut matched: Option<(Project, Version, Vec<Version>)> = None;
    if let Some(p) = project {
        let (versions, _) =
            retry_transient(token, || ctx.catalog.versions(&p.slug, "", "")).await?;
        let exact = exact_match(&versions, version_guess.as_deref()).cloned();
        if let Some(v) = exact {
            matched = Some((p, v, versions));
        }
    }
    if matched.is_none() {
        matched = search_fallback(
            ctx,
            instance,
            &candidate,
            file,
            version_guess.as_deref(),
            derived_loader,
            token,
        )
        .await?;
    }

    let Some((project, version, versions)) = matched else {
        return Err(Error::bad_request(format!("no catalog match for {file}")));
    };

    {
        let mut conn = ctx.pool.get()?;
        db::aliases::upsert(&mut conn, instance.id, &candidate, &project.slug)?;
    }

    touched.insert(canonical_url(&project.slug));
    commit_match(ctx, instance, &parsed, derived_loader, project, version, &versions, by_url)
}

#[allow(clippy::too_many_arguments)]
fn commit_match(
    ctx: &ExecutorContext,
    instance: &Instance,
    parsed: &jarscan::ParsedFilename,
    derived_loader: Option<Loader>,
    project: Project,
    version: Version,
    versions: &[Version],
    by_url: &mut HashMap<String, Mod>,
) -> Result<FileResult> {
    let url = canonical_url(&project.slug);
    let existing = by_url.get(&url).cloned();

    let channel = existing
        .as_ref()
        .map(|m| m.channel)
        .or(parsed.channel)
        .unwrap_or_default();
    let available = pick_available(versions, channel);
    let (available_version, available_channel) = match available {
        Some(v) => (v.version_number.clone(), v.channel().as_str().to_string()),
        None => (version.version_number.clone(), version.channel().as_str().to_string()),
    };
    let download_url = version
        .primary_file()
        .map(|f| f.url.clone())
        .unwrap_or_default();
    let loader_field = version.pick_loader(instance.parsed_loader(), derived_loader);
    let game_version = parsed
        .mc_version
        .clone()
        .unwrap_or_else(|| instance.game_version.clone());

    let mut conn = ctx.pool.get()?;
    match existing {
        Some(current) => {
            let version_changed = current.current_version != version.version_number;
            let changes = ModChanges {
                name: (current.name != project.title && !project.title.is_empty())
                    .then(|| project.title.clone()),
                icon_url: project.icon_url.clone().filter(|i| *i != current.icon_url),
                current_version: version_changed.then(|| version.version_number.clone()),
                available_version: (current.available_version != available_version)
                    .then_some(available_version),
                available_channel: (current.available_channel != available_channel)
                    .then_some(available_channel),
                download_url: (current.download_url != download_url).then_some(download_url),
                loader: (current.loader != loader_field).then_some(loader_field),
                game_version: (current.game_version != game_version).then_some(game_version),
                ..ModChanges::default()
            };
            let updated = if changes.is_empty() {
                current.clone()
            } else {
                db::mods::update(&mut conn, current.id, &changes)?
            };
            if version_changed {
                db::events::insert(
                    &mut conn,
                    NewEvent::updated(
                        instance.id,
                        current.id,
                        &updated.name,
                        &current.current_version,
                        &version.version_number,
                    ),
                )?;
                by_url.insert(url, updated);
                Ok(FileResult::Updated)
            } else {
                by_url.insert(url, updated);
                Ok(FileResult::Unchanged)
            }
        }
        None => {
            let name = if project.title.is_empty() {
                project.slug.clone()
            } else {
                project.title.clone()
            };
            let row = db::mods::create(
                &mut conn,
                NewMod {
                    instance_id: instance.id,
                    name,
                    icon_url: project.icon_url.clone().unwrap_or_default(),
                    url: url.clone(),
                    game_version,
                    loader: loader_field,
                    channel,
                    current_version: version.version_number.clone(),
                    available_version,
                    available_channel,
                    download_url,
                    installed_file: String::new(),
                    installed_version: String::new(),
                    created_at: chrono::Utc::now(),
                },
            )?;
            db::events::insert(
                &mut conn,
                NewEvent::added(instance.id, row.id, &row.name, &row.current_version),
            )?;
            by_url.insert(url, row);
            Ok(FileResult::Added)
        }
    }
}

/// Deletes rows whose jar is gone: neither the download-url basename nor
/// the synthetic `slug-version.jar` name appears in the remote listing.
/// Rows matched during this pass are exempt, whatever their old file was
/// called.
fn reconcile_deletions(
    ctx: &ExecutorContext,
    instance: &Instance,
    preexisting: &[Mod],
    files: &[String],
    touched: &HashSet<String>,
) -> Result<usize> {
    let mut removed = 0;
    let mut conn = ctx.pool.get()?;
    for entry in preexisting {
        if touched.contains(&entry.url) {
            continue;
        }
        let basename = entry
            .download_url
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let synthetic = entry
            .slug()
            .map(|slug| format!("{}-{}.jar", slug, entry.current_version))
            .unwrap_or_default();
        let still_present = files
            .iter()
            .any(|f| (!basename.is_empty() && *f == basename) || (!synthetic.is_empty() && *f == synthetic));
        if !still_present {
            db::mods::delete(&mut conn, entry.id)?;
            db::events::insert(
                &mut conn,
                NewEvent::deleted(instance.id, entry.id, &entry.name, &entry.current_version),
            )?;
            removed += 1;
        }
    }
    Ok(removed)
}

async fn fetch_and_scan(
    ctx: &ExecutorContext,
    server_id: &str,
    folder: &str,
    file: &str,
    token: &CancellationToken,
) -> Result<Option<ArchiveMeta>> {
    let path = format!("{folder}/{file}");
    let (bytes, _) = retry_transient(token, || ctx.remote.fetch_file(server_id, &path)).await?;
    Ok(jarscan::scan_archive(&bytes))
}

/// Resolves a candidate against the catalog. A missing project is not an
/// error here; transient and auth failures are.
async fn resolve_candidate(
    ctx: &ExecutorContext,
    candidate: &str,
    token: &CancellationToken,
) -> Result<Option<Project>> {
    if candidate.is_empty() {
        return Ok(None);
    }
    let result = retry_transient(token, || ctx.catalog.resolve(candidate)).await;
    match result {
        Ok((project, _)) => Ok(Some(project)),
        Err(err) if err.kind() == crate::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

fn exact_match<'a>(versions: &'a [Version], guess: Option<&str>) -> Option<&'a Version> {
    let guess = normalize_version(guess?);
    versions
        .iter()
        .find(|v| normalize_version(&v.version_number) == guess)
}

/// Tokenized search fallback: try every hit for a normalized-exact
/// version match first, then accept the newest version whose file name
/// is similar enough and whose loader set fits the preference order.
async fn search_fallback(
    ctx: &ExecutorContext,
    instance: &Instance,
    candidate: &str,
    file: &str,
    version_guess: Option<&str>,
    derived_loader: Option<Loader>,
    token: &CancellationToken,
) -> Result<Option<(Project, Version, Vec<Version>)>> {
    let query = candidate.replace('-', " ");
    if query.is_empty() {
        return Ok(None);
    }
    let (hits, _) = retry_transient(token, || ctx.catalog.search(&query)).await?;

    let preferred: Vec<Loader> = [instance.parsed_loader(), derived_loader]
        .into_iter()
        .flatten()
        .collect();
    let file_tokens = alnum_tokens(file);

    for hit in hits.iter().take(SEARCH_HIT_CAP) {
        if token.is_cancelled() {
            return Err(Error::canceled());
        }
        let versions = match retry_transient(token, || ctx.catalog.versions(&hit.slug, "", "")).await
        {
            Ok((versions, _)) => versions,
            Err(err) if err.is_canceled() => return Err(err),
            Err(_) => continue,
        };

        let exact = exact_match(&versions, version_guess).cloned();
        if let Some(v) = exact {
            return Ok(Some((project_from_hit(hit), v, versions)));
        }

        let heuristic = versions
            .iter()
            .find(|v| {
                let Some(f) = v.primary_file() else {
                    return false;
                };
                let base = f.url.rsplit('/').next().unwrap_or(&f.url);
                jaccard(&file_tokens, &alnum_tokens(base)) >= SIMILARITY_FLOOR
                    && loader_fits(v, &preferred)
            })
            .cloned();
        if let Some(v) = heuristic {
            return Ok(Some((project_from_hit(hit), v, versions)));
        }
    }
    Ok(None)
}

fn loader_fits(version: &Version, preferred: &[Loader]) -> bool {
    if preferred.is_empty() {
        return true;
    }
    preferred
        .iter()
        .any(|l| version.loaders.iter().any(|vl| vl == l.id()))
}

fn project_from_hit(hit: &SearchHit) -> Project {
    Project {
        slug: hit.slug.clone(),
        title: hit.title.clone(),
        icon_url: hit.icon_url.clone(),
        game_versions: Vec::new(),
        loaders: Vec::new(),
    }
}
