#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use modwarden::clients::modrinth::{
	CatalogClient, CatalogError, Project, SearchHit, Version, VersionFile,
};
use modwarden::clients::pufferpanel::{
	FileEntry, PufferClient, RemoteError, ServerDefinition, ServerRef,
};
use modwarden::configuration::{
	DatabaseSettings, EnvFlags, LoggingSettings, ModrinthSettings, PufferPanelSettings,
	SchedulerSettings, ServerSettings, Settings,
};
use modwarden::db::{self, DbConn};
use modwarden::domain::app_state::{App, AppState};
use modwarden::domain::instance::{Instance, InstanceName, NewInstance};
use modwarden::domain::loader::Loader;
use modwarden::jobs::JobId;

/// Remote control-plane fake backed by an in-memory file map.
#[derive(Default)]
pub struct FakePuffer {
	pub servers: Vec<ServerRef>,
	pub definition: Option<Value>,
	pub data: Option<Value>,
	pub files: Mutex<BTreeMap<String, Vec<u8>>>,
	pub puts: Mutex<Vec<String>>,
	pub deletes: Mutex<Vec<String>>,
	/// Per-fetch artificial latency, for cancellation tests.
	pub fetch_delay: Option<Duration>,
	/// When set, delete_file reports success but leaves the file.
	pub stuck_deletes: bool,
}

impl FakePuffer {
	pub fn with_server(id: &str, name: &str) -> Self {
		Self {
			servers: vec![ServerRef {
				id: id.to_string(),
				name: name.to_string(),
			}],
			..Self::default()
		}
	}

	pub fn add_file(&self, path: &str, bytes: Vec<u8>) {
		self.files.lock().unwrap().insert(path.to_string(), bytes);
	}

	pub fn file_names(&self, folder: &str) -> Vec<String> {
		let prefix = format!("{folder}/");
		self.files
			.lock()
			.unwrap()
			.keys()
			.filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
			.collect()
	}

	fn not_found(what: &str) -> RemoteError {
		RemoteError::Status {
			status: 404,
			message: format!("{what} not found"),
		}
	}
}

#[async_trait]
impl PufferClient for FakePuffer {
	async fn get_server(&self, server_id: &str) -> Result<ServerRef, RemoteError> {
		self.servers
			.iter()
			.find(|s| s.id == server_id)
			.cloned()
			.ok_or_else(|| Self::not_found("server"))
	}

	async fn get_definition(&self, _server_id: &str) -> Result<ServerDefinition, RemoteError> {
		match &self.definition {
			Some(raw) => serde_json::from_value(raw.clone())
				.map_err(|err| RemoteError::Transport(err.to_string())),
			None => Err(Self::not_found("definition")),
		}
	}

	async fn get_definition_raw(&self, _server_id: &str) -> Result<Value, RemoteError> {
		self.definition
			.clone()
			.ok_or_else(|| Self::not_found("definition"))
	}

	async fn get_data(&self, _server_id: &str) -> Result<Value, RemoteError> {
		self.data.clone().ok_or_else(|| Self::not_found("data"))
	}

	async fn list_path(&self, _server_id: &str, path: &str) -> Result<Vec<FileEntry>, RemoteError> {
		let prefix = format!("{path}/");
		let entries = self
			.files
			.lock()
			.unwrap()
			.iter()
			.filter_map(|(k, v)| {
				k.strip_prefix(&prefix).map(|name| FileEntry {
					name: name.to_string(),
					is_file: true,
					size: v.len() as u64,
				})
			})
			.collect();
		Ok(entries)
	}

	async fn fetch_file(&self, _server_id: &str, path: &str) -> Result<Vec<u8>, RemoteError> {
		if let Some(delay) = self.fetch_delay {
			tokio::time::sleep(delay).await;
		}
		self.files
			.lock()
			.unwrap()
			.get(path)
			.cloned()
			.ok_or_else(|| Self::not_found(path))
	}

	async fn put_file(
		&self,
		_server_id: &str,
		path: &str,
		bytes: Vec<u8>,
	) -> Result<(), RemoteError> {
		self.puts.lock().unwrap().push(path.to_string());
		self.files.lock().unwrap().insert(path.to_string(), bytes);
		Ok(())
	}

	async fn delete_file(&self, _server_id: &str, path: &str) -> Result<(), RemoteError> {
		self.deletes.lock().unwrap().push(path.to_string());
		if !self.stuck_deletes {
			self.files.lock().unwrap().remove(path);
		}
		Ok(())
	}

	async fn list_servers(&self) -> Result<Vec<ServerRef>, RemoteError> {
		Ok(self.servers.clone())
	}
}

/// Catalog fake over a static project/version table.
#[derive(Default)]
pub struct FakeCatalog {
	pub projects: HashMap<String, (Project, Vec<Version>)>,
	pub artifacts: HashMap<String, Vec<u8>>,
}

impl FakeCatalog {
	pub fn add_project(&mut self, slug: &str, title: &str, versions: Vec<Version>) {
		for version in &versions {
			for file in &version.files {
				self.artifacts
					.entry(file.url.clone())
					.or_insert_with(|| vec![7u8; file.size as usize]);
			}
		}
		self.projects.insert(
			slug.to_string(),
			(
				Project {
					slug: slug.to_string(),
					title: title.to_string(),
					icon_url: None,
					game_versions: versions
						.iter()
						.flat_map(|v| v.game_versions.clone())
						.collect(),
					loaders: versions.iter().flat_map(|v| v.loaders.clone()).collect(),
				},
				versions,
			),
		);
	}

	fn not_found() -> CatalogError {
		CatalogError::Status {
			status: 404,
			message: "project not found".to_string(),
		}
	}
}

#[async_trait]
impl CatalogClient for FakeCatalog {
	async fn project(&self, slug: &str) -> Result<Project, CatalogError> {
		self.projects
			.get(slug)
			.map(|(p, _)| p.clone())
			.ok_or_else(Self::not_found)
	}

	async fn versions(
		&self,
		slug: &str,
		_game_version: &str,
		_loader: &str,
	) -> Result<Vec<Version>, CatalogError> {
		self.projects
			.get(slug)
			.map(|(_, v)| v.clone())
			.ok_or_else(Self::not_found)
	}

	async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CatalogError> {
		let tokens: Vec<&str> = query.split_whitespace().collect();
		let hits = self
			.projects
			.values()
			.filter(|(p, _)| {
				tokens
					.iter()
					.any(|t| p.slug.contains(t) || p.title.to_lowercase().contains(t))
			})
			.map(|(p, _)| SearchHit {
				slug: p.slug.clone(),
				title: p.title.clone(),
				icon_url: None,
			})
			.collect();
		Ok(hits)
	}

	async fn resolve(&self, candidate: &str) -> Result<Project, CatalogError> {
		self.project(candidate).await
	}

	async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, CatalogError> {
		self.artifacts.get(url).cloned().ok_or_else(Self::not_found)
	}
}

/// Builds a release-channel catalog version with one primary file.
pub fn catalog_version(number: &str, channel: &str, loader: &str, filename: &str) -> Version {
	Version {
		id: format!("v-{number}"),
		name: number.to_string(),
		version_number: number.to_string(),
		version_type: channel.to_string(),
		game_versions: vec!["1.20.1".to_string()],
		loaders: vec![loader.to_string()],
		files: vec![VersionFile {
			url: format!("https://cdn.example/{filename}"),
			filename: filename.to_string(),
			primary: true,
			size: 2048,
		}],
		date_published: String::new(),
	}
}

/// A tiny jar whose only entry is a loader manifest.
pub fn jar_bytes(entry: &str, content: &str) -> Vec<u8> {
	let mut buf = std::io::Cursor::new(Vec::new());
	let mut writer = zip::ZipWriter::new(&mut buf);
	writer
		.start_file(entry, zip::write::SimpleFileOptions::default())
		.unwrap();
	writer.write_all(content.as_bytes()).unwrap();
	writer.finish().unwrap();
	buf.into_inner()
}

pub fn fabric_jar(id: &str, version: &str) -> Vec<u8> {
	jar_bytes(
		"fabric.mod.json",
		&format!(r#"{{"id": "{id}", "version": "{version}"}}"#),
	)
}

fn test_settings(db_path: &str) -> Settings {
	Settings {
		server: ServerSettings {
			axum_host: "127.0.0.1".parse().unwrap(),
			axum_port: 0,
			static_dir: "web/dist".to_string(),
		},
		database: DatabaseSettings {
			path: db_path.to_string(),
			pool_size: Some(4),
		},
		pufferpanel: PufferPanelSettings {
			base_url: "http://panel.invalid".to_string(),
			client_id: "test".to_string(),
			client_secret: "test".to_string().into(),
		},
		modrinth: ModrinthSettings {
			base_url: "http://catalog.invalid".to_string(),
			token: String::new(),
		},
		scheduler: SchedulerSettings::default(),
		logging: LoggingSettings::default(),
		instance_name_max_graphemes: 120,
		env: EnvFlags::default(),
	}
}

pub struct TestApp {
	pub server: TestServer,
	pub state: AppState,
	pub shutdown: CancellationToken,
	_tmp: tempfile::TempDir,
}

impl TestApp {
	pub async fn spawn(remote: Arc<FakePuffer>, catalog: Arc<FakeCatalog>) -> TestApp {
		Self::spawn_with(remote, catalog, |_| {}).await
	}

	pub async fn spawn_with(
		remote: Arc<FakePuffer>,
		catalog: Arc<FakeCatalog>,
		tweak: impl FnOnce(&mut Settings),
	) -> TestApp {
		let tmp = tempfile::TempDir::new().expect("Failed to create temp dir");
		let db_path = tmp.path().join("modwarden-test.db");
		let mut settings = test_settings(db_path.to_str().unwrap());
		tweak(&mut settings);

		let pool = db::connection::initialize_pool(&settings.database);
		db::migrations::run_migrations_or_die(&pool);

		let shutdown = CancellationToken::new();
		let (app, runner) =
			App::with_parts(Arc::new(pool), remote, catalog, settings, shutdown.clone());
		let state = AppState(Arc::new(app));
		tokio::spawn(runner.run());

		let router = modwarden::net::router::init(state.clone());
		let server = TestServer::new(router).expect("Failed to start test server");
		TestApp {
			server,
			state,
			shutdown,
			_tmp: tmp,
		}
	}

	pub fn conn(&self) -> DbConn {
		self.state.db_pool.get().expect("Failed to get connection")
	}

	pub fn create_instance(&self, name: &str, loader: Option<Loader>, server_id: &str) -> Instance {
		let mut conn = self.conn();
		db::instances::create(
			&mut conn,
			NewInstance::new(
				InstanceName::parse(name, 120).unwrap(),
				loader,
				server_id.to_string(),
			),
		)
		.expect("Failed to create instance")
	}

	/// Blocks until the job reaches a terminal status, bounded by a test
	/// deadline.
	pub async fn wait_job(&self, job_id: JobId) {
		let progress = self.state.engine.progress(job_id).expect("job not found");
		tokio::time::timeout(Duration::from_secs(15), progress.wait_terminal())
			.await
			.expect("job did not finish in time");
	}
}
