mod common;

use std::sync::Arc;

use serde_json::json;

use common::{FakeCatalog, FakePuffer, TestApp, catalog_version};
use modwarden::db;
use modwarden::domain::sync_job::JobStatus;
use modwarden::jobs::JobId;

#[tokio::test]
async fn duplicate_enqueue_returns_the_same_job() {
    let mut remote = FakePuffer::with_server("srv-1", "Idem");
    remote.definition = Some(json!({"install": [{"type": "fabricdl"}]}));
    let app = TestApp::spawn(Arc::new(remote), Arc::new(FakeCatalog::default())).await;
    let instance = app.create_instance("Idem", None, "srv-1");

    let (first, _) = app
        .state
        .engine
        .enqueue_sync(&instance, "srv-1", Some("k".to_string()))
        .await
        .unwrap();
    let (second, _) = app
        .state
        .engine
        .enqueue_sync(&instance, "srv-1", Some("k".to_string()))
        .await
        .unwrap();

    assert_eq!(first, second);
    let mut conn = app.conn();
    assert_eq!(
        db::sync_jobs::count_for_instance(&mut conn, instance.id).unwrap(),
        1
    );
}

#[tokio::test]
async fn retry_reruns_only_the_failed_files() {
    let mut remote = FakePuffer::with_server("srv-1", "Retry");
    remote.definition = Some(json!({"install": [{"type": "fabricdl"}]}));
    remote.add_file("mods/sodium-0.5.8.jar", vec![9, 9]);
    remote.add_file("mods/a.jar", vec![0]);
    remote.add_file("mods/b.jar", vec![0]);

    let mut catalog = FakeCatalog::default();
    catalog.add_project(
        "sodium",
        "Sodium",
        vec![catalog_version("0.5.8", "release", "fabric", "sodium-0.5.8.jar")],
    );

    let app = TestApp::spawn(Arc::new(remote), Arc::new(catalog)).await;
    let instance = app.create_instance("Retry", None, "srv-1");
    let (job_id, _) = app
        .state
        .engine
        .enqueue_sync(&instance, "srv-1", None)
        .await
        .unwrap();
    app.wait_job(job_id).await;

    let snapshot = app.state.engine.snapshot(job_id).unwrap();
    assert_eq!(snapshot.status, JobStatus::Succeeded.as_str());
    assert_eq!(snapshot.failed, 2);
    let mut failed_names: Vec<String> =
        snapshot.failures.iter().map(|f| f.name.clone()).collect();
    failed_names.sort();
    assert_eq!(failed_names, vec!["a.jar".to_string(), "b.jar".to_string()]);

    let retry_id = app.state.engine.retry_failed(job_id).await.unwrap();
    assert_ne!(retry_id, job_id);
    app.wait_job(retry_id).await;

    let retry_snapshot = app.state.engine.snapshot(retry_id).unwrap();
    assert_eq!(
        retry_snapshot.total, 2,
        "retry must be restricted to the recorded failures"
    );
}

#[tokio::test]
async fn retry_refuses_jobs_without_failures() {
    let mut remote = FakePuffer::with_server("srv-1", "Clean");
    remote.definition = Some(json!({"install": [{"type": "fabricdl"}]}));
    let app = TestApp::spawn(Arc::new(remote), Arc::new(FakeCatalog::default())).await;
    let instance = app.create_instance("Clean", None, "srv-1");

    let (job_id, _) = app
        .state
        .engine
        .enqueue_sync(&instance, "srv-1", None)
        .await
        .unwrap();
    app.wait_job(job_id).await;

    let err = app.state.engine.retry_failed(job_id).await.unwrap_err();
    assert_eq!(err.kind(), modwarden::ErrorKind::BadRequest);
}

#[tokio::test]
async fn canceling_a_queued_job_unblocks_waiters() {
    // No definition and no files; the job would fail anyway, but here it
    // is canceled before any worker picks it up meaningfully.
    let remote = FakePuffer::with_server("srv-1", "Queued");
    let app = TestApp::spawn(Arc::new(remote), Arc::new(FakeCatalog::default())).await;
    let instance = app.create_instance("Queued", None, "srv-1");

    let (job_id, completion) = app
        .state
        .engine
        .enqueue_sync(&instance, "srv-1", None)
        .await
        .unwrap();
    app.state.engine.cancel(job_id).await.unwrap();

    let mut completion = completion;
    tokio::time::timeout(std::time::Duration::from_secs(10), completion.wait_for(|d| *d))
        .await
        .expect("waiter was not unblocked")
        .unwrap();

    let snapshot = app.state.engine.snapshot(job_id).unwrap();
    assert!(
        snapshot.status == JobStatus::Canceled.as_str()
            || snapshot.status == JobStatus::Failed.as_str(),
        "status was {}",
        snapshot.status
    );
}

#[tokio::test]
async fn unknown_jobs_are_not_found() {
    let remote = FakePuffer::with_server("srv-1", "Empty");
    let app = TestApp::spawn(Arc::new(remote), Arc::new(FakeCatalog::default())).await;
    let err = app.state.engine.snapshot(JobId::Sync(999)).unwrap_err();
    assert_eq!(err.kind(), modwarden::ErrorKind::NotFound);
}
