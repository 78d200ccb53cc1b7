mod common;

use std::sync::Arc;

use serde_json::json;

use common::{FakeCatalog, FakePuffer, TestApp, catalog_version};
use modwarden::db;
use modwarden::domain::instance::Instance;
use modwarden::domain::mod_entry::{Channel, Mod, NewMod, canonical_url};
use modwarden::domain::update_job::UpdateState;
use modwarden::jobs::JobId;

fn tracked_mod(app: &TestApp, instance: &Instance, slug: &str, current: &str, available: &str) -> Mod {
    let mut conn = app.conn();
    db::mods::create(
        &mut conn,
        NewMod {
            instance_id: instance.id,
            name: slug.to_string(),
            icon_url: String::new(),
            url: canonical_url(slug),
            game_version: "1.20.1".to_string(),
            loader: "fabric".to_string(),
            channel: Channel::Release,
            current_version: current.to_string(),
            available_version: available.to_string(),
            available_channel: "release".to_string(),
            download_url: String::new(),
            installed_file: String::new(),
            installed_version: String::new(),
            created_at: chrono::Utc::now(),
        },
    )
    .unwrap()
}

fn update_row_id(job_id: JobId) -> i64 {
    match job_id {
        JobId::Update(id) => id,
        JobId::Sync(id) => id,
    }
}

#[tokio::test]
async fn update_replaces_the_old_artifact_and_commits() {
    let mut remote = FakePuffer::with_server("srv-1", "Updating");
    remote.definition = Some(json!({"install": [{"type": "fabricdl"}]}));
    remote.add_file("mods/sodium-0.5.7.jar", vec![1; 100]);

    let mut catalog = FakeCatalog::default();
    catalog.add_project(
        "sodium",
        "Sodium",
        vec![
            catalog_version("0.5.8", "release", "fabric", "sodium-0.5.8.jar"),
            catalog_version("0.5.7", "release", "fabric", "sodium-0.5.7.jar"),
        ],
    );

    let app = TestApp::spawn(Arc::new(remote), Arc::new(catalog)).await;
    let instance = app.create_instance("Updating", None, "srv-1");
    let entry = tracked_mod(&app, &instance, "sodium", "0.5.7", "0.5.8");

    let job_id = app
        .state
        .engine
        .enqueue_update(&entry, "k-1".to_string())
        .await
        .unwrap();
    app.wait_job(job_id).await;

    let mut conn = app.conn();
    let row = db::mod_updates::get_by_id(&mut conn, update_row_id(job_id)).unwrap();
    assert_eq!(row.status, UpdateState::Succeeded);

    let refreshed = db::mods::get_by_id(&mut conn, entry.id).unwrap();
    assert_eq!(refreshed.current_version, "0.5.8");
    assert!(refreshed.is_up_to_date());

    let events = db::events::list_by_instance(&mut conn, instance.id, 10).unwrap();
    let updated = events
        .iter()
        .find(|e| e.action == modwarden::domain::event::EventAction::Updated)
        .expect("updated event missing");
    assert_eq!(updated.from_version, "0.5.7");
    assert_eq!(updated.to_version, "0.5.8");
}

#[tokio::test]
async fn update_short_circuits_when_the_artifact_is_already_there() {
    let mut remote = FakePuffer::with_server("srv-1", "Current");
    remote.definition = Some(json!({"install": [{"type": "fabricdl"}]}));

    let mut catalog = FakeCatalog::default();
    // The version file has no version in its name, so the planner cannot
    // read an installed version and the size comparison decides.
    catalog.add_project(
        "sodium",
        "Sodium",
        vec![catalog_version("0.5.8", "release", "fabric", "sodium.jar")],
    );
    let artifact = catalog
        .artifacts
        .get("https://cdn.example/sodium.jar")
        .cloned()
        .unwrap();
    remote.add_file("mods/sodium.jar", artifact);

    let remote = Arc::new(remote);
    let app = TestApp::spawn(Arc::clone(&remote), Arc::new(catalog)).await;
    let instance = app.create_instance("Current", None, "srv-1");
    let entry = tracked_mod(&app, &instance, "sodium", "0.5.7", "0.5.8");

    let job_id = app
        .state
        .engine
        .enqueue_update(&entry, "k-1".to_string())
        .await
        .unwrap();
    app.wait_job(job_id).await;

    let mut conn = app.conn();
    let row = db::mod_updates::get_by_id(&mut conn, update_row_id(job_id)).unwrap();
    assert_eq!(row.status, UpdateState::Succeeded);

    // Nothing was removed from the remote.
    assert!(remote.deletes.lock().unwrap().is_empty());

    // The success event carries the already-current reason.
    let progress = app.state.engine.progress(job_id).unwrap();
    let (events, _) = progress.events_since(0);
    let succeeded = events
        .iter()
        .find(|e| e.name == "succeeded")
        .expect("succeeded event missing");
    assert_eq!(
        succeeded.data.get("reason").and_then(|r| r.as_str()),
        Some("already_current")
    );
}

#[tokio::test]
async fn stuck_old_file_yields_partial_success_without_db_commit() {
    let mut remote = FakePuffer::with_server("srv-1", "Stuck");
    remote.definition = Some(json!({"install": [{"type": "fabricdl"}]}));
    remote.add_file("mods/sodium-0.5.7.jar", vec![1; 100]);
    remote.stuck_deletes = true;

    let mut catalog = FakeCatalog::default();
    catalog.add_project(
        "sodium",
        "Sodium",
        vec![catalog_version("0.5.8", "release", "fabric", "sodium-0.5.8.jar")],
    );

    let remote = Arc::new(remote);
    let app = TestApp::spawn(Arc::clone(&remote), Arc::new(catalog)).await;
    let instance = app.create_instance("Stuck", None, "srv-1");
    let entry = tracked_mod(&app, &instance, "sodium", "0.5.7", "0.5.8");

    let job_id = app
        .state
        .engine
        .enqueue_update(&entry, "k-1".to_string())
        .await
        .unwrap();
    app.wait_job(job_id).await;

    let mut conn = app.conn();
    let row = db::mod_updates::get_by_id(&mut conn, update_row_id(job_id)).unwrap();
    assert_eq!(row.status, UpdateState::PartialSuccess);
    assert!(row.error.unwrap().contains("still present"));

    // The new file is in place and verified, but the store is untouched.
    let names = remote.file_names("mods");
    assert!(names.contains(&"sodium-0.5.8.jar".to_string()));
    let refreshed = db::mods::get_by_id(&mut conn, entry.id).unwrap();
    assert_eq!(refreshed.current_version, "0.5.7");
}

#[tokio::test]
async fn duplicate_update_enqueue_is_idempotent() {
    let mut remote = FakePuffer::with_server("srv-1", "Once");
    remote.definition = Some(json!({"install": [{"type": "fabricdl"}]}));
    let mut catalog = FakeCatalog::default();
    catalog.add_project(
        "sodium",
        "Sodium",
        vec![catalog_version("0.5.8", "release", "fabric", "sodium-0.5.8.jar")],
    );

    let app = TestApp::spawn(Arc::new(remote), Arc::new(catalog)).await;
    let instance = app.create_instance("Once", None, "srv-1");
    let entry = tracked_mod(&app, &instance, "sodium", "0.5.7", "0.5.8");

    let first = app
        .state
        .engine
        .enqueue_update(&entry, "same-key".to_string())
        .await
        .unwrap();
    let second = app
        .state
        .engine
        .enqueue_update(&entry, "same-key".to_string())
        .await
        .unwrap();
    assert_eq!(first, second);
}
