mod common;

use std::sync::Arc;

use serde_json::{Value, json};

use common::{FakeCatalog, FakePuffer, TestApp, catalog_version};
use modwarden::db;
use modwarden::domain::instance::InstanceChanges;
use modwarden::domain::loader::Loader;

fn sodium_catalog() -> FakeCatalog {
    let mut catalog = FakeCatalog::default();
    catalog.add_project(
        "sodium",
        "Sodium",
        vec![
            catalog_version("0.5.9-beta", "beta", "fabric", "sodium-0.5.9-beta.jar"),
            catalog_version("0.5.8", "release", "fabric", "sodium-0.5.8.jar"),
            catalog_version("0.5.7", "release", "fabric", "sodium-0.5.7.jar"),
        ],
    );
    catalog
}

#[tokio::test]
async fn metadata_annotates_versions() {
    let remote = FakePuffer::with_server("srv-1", "Meta");
    let app = TestApp::spawn(Arc::new(remote), Arc::new(sodium_catalog())).await;

    let response = app
        .server
        .post("/api/mods/metadata")
        .json(&json!({"url": "https://modrinth.com/mod/sodium"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["slug"], "sodium");
    assert_eq!(body["channels"].as_array().unwrap().len(), 2);
    let versions = body["versions"].as_array().unwrap();
    assert_eq!(versions.len(), 3);
    assert_eq!(versions[0]["isNewest"], true);
    assert_eq!(versions[0]["isPrerelease"], true);
    assert_eq!(versions[1]["isNewest"], false);
    assert_eq!(versions[1]["isPrerelease"], false);
}

#[tokio::test]
async fn create_lists_and_deletes_a_mod() {
    let remote = FakePuffer::with_server("srv-1", "Crud");
    let app = TestApp::spawn(Arc::new(remote), Arc::new(sodium_catalog())).await;
    let instance = app.create_instance("Crud", Some(Loader::Fabric), "srv-1");

    let created = app
        .server
        .post("/api/mods")
        .json(&json!({
            "instanceId": instance.id,
            "url": "https://modrinth.com/mod/sodium",
        }))
        .await;
    created.assert_status(axum::http::StatusCode::CREATED);
    let body: Value = created.json();
    assert_eq!(body["currentVersion"], "0.5.8");
    assert_eq!(body["upToDate"], true);
    let mod_id = body["id"].as_i64().unwrap();

    // Same project twice on one instance is a conflict.
    let duplicate = app
        .server
        .post("/api/mods")
        .json(&json!({
            "instanceId": instance.id,
            "url": "https://modrinth.com/mod/sodium",
        }))
        .await;
    duplicate.assert_status(axum::http::StatusCode::CONFLICT);

    let listed = app
        .server
        .get(&format!("/api/mods?instance_id={}", instance.id))
        .await;
    listed.assert_status_ok();
    assert_eq!(listed.json::<Value>().as_array().unwrap().len(), 1);

    let deleted = app
        .server
        .delete(&format!("/api/mods/{mod_id}?instance_id={}", instance.id))
        .await;
    deleted.assert_status(axum::http::StatusCode::NO_CONTENT);

    let mut conn = app.conn();
    assert!(db::mods::find_by_id(&mut conn, mod_id).unwrap().is_none());
}

#[tokio::test]
async fn exact_version_selection_by_id() {
    let remote = FakePuffer::with_server("srv-1", "Pinned");
    let app = TestApp::spawn(Arc::new(remote), Arc::new(sodium_catalog())).await;
    let instance = app.create_instance("Pinned", Some(Loader::Fabric), "srv-1");

    let created = app
        .server
        .post("/api/mods")
        .json(&json!({
            "instanceId": instance.id,
            "url": "sodium",
            "versionId": "v-0.5.7",
        }))
        .await;
    created.assert_status(axum::http::StatusCode::CREATED);
    let body: Value = created.json();
    assert_eq!(body["currentVersion"], "0.5.7");
    assert_eq!(body["availableVersion"], "0.5.8");
    assert_eq!(body["upToDate"], false);
}

#[tokio::test]
async fn gated_instances_refuse_mod_mutations() {
    let remote = FakePuffer::with_server("srv-1", "Gated");
    let app = TestApp::spawn(Arc::new(remote), Arc::new(sodium_catalog())).await;
    let instance = app.create_instance("Gated", None, "srv-1");
    {
        let mut conn = app.conn();
        db::instances::update(
            &mut conn,
            instance.id,
            &InstanceChanges {
                requires_loader: Some(true),
                ..InstanceChanges::default()
            },
        )
        .unwrap();
    }

    let created = app
        .server
        .post("/api/mods")
        .json(&json!({"instanceId": instance.id, "url": "sodium"}))
        .await;
    created.assert_status(axum::http::StatusCode::CONFLICT);
    assert_eq!(created.json::<Value>()["code"], "loader_required");
}

#[tokio::test]
async fn check_is_a_dry_run() {
    let remote = FakePuffer::with_server("srv-1", "Check");
    let app = TestApp::spawn(Arc::new(remote), Arc::new(sodium_catalog())).await;
    let instance = app.create_instance("Check", Some(Loader::Fabric), "srv-1");

    let mut conn = app.conn();
    let entry = db::mods::create(
        &mut conn,
        modwarden::domain::mod_entry::NewMod {
            instance_id: instance.id,
            name: "Sodium".into(),
            icon_url: String::new(),
            url: "https://modrinth.com/mod/sodium".into(),
            game_version: String::new(),
            loader: "fabric".into(),
            channel: Default::default(),
            current_version: "0.5.7".into(),
            available_version: "0.5.7".into(),
            available_channel: "release".into(),
            download_url: String::new(),
            installed_file: String::new(),
            installed_version: String::new(),
            created_at: chrono::Utc::now(),
        },
    )
    .unwrap();
    drop(conn);

    let response = app.server.get(&format!("/api/mods/{}/check", entry.id)).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["currentVersion"], "0.5.7");
    assert_eq!(body["availableVersion"], "0.5.8");
    assert_eq!(body["upToDate"], false);

    // The row itself is untouched.
    let mut conn = app.conn();
    let unchanged = db::mods::get_by_id(&mut conn, entry.id).unwrap();
    assert_eq!(unchanged.available_version, "0.5.7");
}

#[tokio::test]
async fn channel_change_recomputes_the_available_version() {
    let remote = FakePuffer::with_server("srv-1", "Channels");
    let app = TestApp::spawn(Arc::new(remote), Arc::new(sodium_catalog())).await;
    let instance = app.create_instance("Channels", Some(Loader::Fabric), "srv-1");

    let mut conn = app.conn();
    let entry = db::mods::create(
        &mut conn,
        modwarden::domain::mod_entry::NewMod {
            instance_id: instance.id,
            name: "Sodium".into(),
            icon_url: String::new(),
            url: "https://modrinth.com/mod/sodium".into(),
            game_version: String::new(),
            loader: "fabric".into(),
            channel: Default::default(),
            current_version: "0.5.8".into(),
            available_version: "0.5.8".into(),
            available_channel: "release".into(),
            download_url: String::new(),
            installed_file: String::new(),
            installed_version: String::new(),
            created_at: chrono::Utc::now(),
        },
    )
    .unwrap();
    drop(conn);

    let response = app
        .server
        .put(&format!("/api/mods/{}", entry.id))
        .json(&json!({"channel": "beta"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["channel"], "beta");
    // Release still wins while one exists, per the channel policy.
    assert_eq!(body["availableVersion"], "0.5.8");
}

#[tokio::test]
async fn update_async_enqueues_idempotently() {
    let mut remote = FakePuffer::with_server("srv-1", "Async");
    remote.definition = Some(json!({"install": [{"type": "fabricdl"}]}));
    let app = TestApp::spawn(Arc::new(remote), Arc::new(sodium_catalog())).await;
    let instance = app.create_instance("Async", Some(Loader::Fabric), "srv-1");

    let mut conn = app.conn();
    let entry = db::mods::create(
        &mut conn,
        modwarden::domain::mod_entry::NewMod {
            instance_id: instance.id,
            name: "Sodium".into(),
            icon_url: String::new(),
            url: "https://modrinth.com/mod/sodium".into(),
            game_version: String::new(),
            loader: "fabric".into(),
            channel: Default::default(),
            current_version: "0.5.7".into(),
            available_version: "0.5.8".into(),
            available_channel: "release".into(),
            download_url: String::new(),
            installed_file: String::new(),
            installed_version: String::new(),
            created_at: chrono::Utc::now(),
        },
    )
    .unwrap();
    drop(conn);

    let first = app
        .server
        .post(&format!("/api/mods/{}/update-async", entry.id))
        .json(&json!({"idempotency_key": "apply-1"}))
        .await;
    first.assert_status_ok();
    let first_id = first.json::<Value>()["job_id"].as_str().unwrap().to_string();

    let second = app
        .server
        .post(&format!("/api/mods/{}/update-async", entry.id))
        .json(&json!({"idempotency_key": "apply-1"}))
        .await;
    second.assert_status_ok();
    let second_id = second.json::<Value>()["job_id"].as_str().unwrap().to_string();
    assert_eq!(first_id, second_id);
}
