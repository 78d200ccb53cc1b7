//! Remote control-plane client.
//!
//! `PufferClient` is the capability interface the executors depend on;
//! the HTTP implementation talks to a PufferPanel deployment with OAuth2
//! client credentials. Tests inject fakes through the trait.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::domain::error::{Error, ErrorKind};

/// How long a list-servers result stays fresh per base URL.
const SERVERS_CACHE_TTL: Duration = Duration::from_secs(2);
/// Safety margin subtracted from OAuth token lifetimes.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Typed error of the remote control-plane boundary.
#[derive(Debug, Clone)]
pub enum RemoteError {
	/// The remote answered with a non-success status.
	Status { status: u16, message: String },
	/// The request never completed (connect error, timeout, bad body).
	Transport(String),
}

impl RemoteError {
	pub fn status(&self) -> Option<u16> {
		match self {
			RemoteError::Status { status, .. } => Some(*status),
			RemoteError::Transport(_) => None,
		}
	}

	pub fn is_not_found(&self) -> bool {
		self.status() == Some(404)
	}

	/// Transient errors are eligible for the retry budget.
	pub fn is_transient(&self) -> bool {
		match self {
			RemoteError::Status { status, .. } => *status == 429 || (500..=599).contains(status),
			RemoteError::Transport(_) => true,
		}
	}
}

impl fmt::Display for RemoteError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RemoteError::Status { status, message } => {
				write!(f, "remote returned {status}: {message}")
			}
			RemoteError::Transport(message) => write!(f, "remote unreachable: {message}"),
		}
	}
}

impl std::error::Error for RemoteError {}

impl From<reqwest::Error> for RemoteError {
	fn from(err: reqwest::Error) -> Self {
		RemoteError::Transport(err.to_string())
	}
}

impl From<RemoteError> for Error {
	fn from(err: RemoteError) -> Error {
		match err.status() {
			Some(404) => Error::not_found(err.to_string()),
			Some(401) | Some(403) => Error::forbidden("remote permission insufficient"),
			Some(429) => Error::too_many_requests("remote rate limit exceeded"),
			Some(s) if (500..=599).contains(&s) => Error::bad_gateway(err.to_string()),
			Some(_) => (ErrorKind::BadRequest, "remote rejected request", err.to_string()).into(),
			None => Error::bad_gateway(err.to_string()),
		}
	}
}

/// One server as listed by the control plane.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerRef {
	pub id: String,
	#[serde(default)]
	pub name: String,
}

/// One entry of a remote folder listing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
	pub name: String,
	#[serde(default)]
	pub is_file: bool,
	#[serde(default)]
	pub size: u64,
}

/// Typed view of a server template definition. Only the fields loader
/// and version detection care about; the raw JSON carries the rest.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ServerDefinition {
	#[serde(default)]
	pub display: String,
	#[serde(default, rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub environment: EnvironmentDef,
	#[serde(default)]
	pub install: Vec<InstallStep>,
	#[serde(default)]
	pub run: RunSpec,
	#[serde(default)]
	pub data: HashMap<String, VariableDef>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct EnvironmentDef {
	#[serde(default)]
	pub display: String,
	#[serde(default, rename = "type")]
	pub kind: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct InstallStep {
	#[serde(default, rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub commands: Vec<String>,
	#[serde(default)]
	pub target: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RunSpec {
	#[serde(default)]
	pub command: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct VariableDef {
	#[serde(default)]
	pub display: String,
	#[serde(default, rename = "desc")]
	pub description: String,
	#[serde(default)]
	pub value: serde_json::Value,
	#[serde(default)]
	pub options: Vec<serde_json::Value>,
}

/// Capability interface over the remote control plane.
#[async_trait]
pub trait PufferClient: Send + Sync {
	async fn get_server(&self, server_id: &str) -> Result<ServerRef, RemoteError>;
	async fn get_definition(&self, server_id: &str) -> Result<ServerDefinition, RemoteError>;
	async fn get_definition_raw(&self, server_id: &str) -> Result<serde_json::Value, RemoteError>;
	async fn get_data(&self, server_id: &str) -> Result<serde_json::Value, RemoteError>;
	async fn list_path(&self, server_id: &str, path: &str) -> Result<Vec<FileEntry>, RemoteError>;
	async fn fetch_file(&self, server_id: &str, path: &str) -> Result<Vec<u8>, RemoteError>;
	async fn put_file(&self, server_id: &str, path: &str, bytes: Vec<u8>)
	-> Result<(), RemoteError>;
	async fn delete_file(&self, server_id: &str, path: &str) -> Result<(), RemoteError>;
	async fn list_servers(&self) -> Result<Vec<ServerRef>, RemoteError>;
}

#[derive(Deserialize)]
struct TokenResponse {
	access_token: String,
	#[serde(default = "default_expiry")]
	expires_in: u64,
}

fn default_expiry() -> u64 {
	3600
}

struct CachedToken {
	token: String,
	expires_at: Instant,
}

#[derive(Deserialize)]
struct ServerListPage {
	#[serde(default)]
	servers: Vec<ServerRef>,
}

/// HTTP implementation against a PufferPanel deployment.
pub struct HttpPufferClient {
	http: reqwest::Client,
	base_url: String,
	client_id: String,
	client_secret: SecretString,
	token: Mutex<Option<CachedToken>>,
	// Keyed by base URL; refresh is serialized by the lock so concurrent
	// callers coalesce onto a single upstream request.
	servers_cache: Mutex<HashMap<String, (Instant, Vec<ServerRef>)>>,
}

impl HttpPufferClient {
	pub fn new(base_url: &str, client_id: &str, client_secret: SecretString) -> Self {
		Self {
			http: reqwest::Client::new(),
			base_url: base_url.trim_end_matches('/').to_string(),
			client_id: client_id.to_string(),
			client_secret,
			token: Mutex::new(None),
			servers_cache: Mutex::new(HashMap::new()),
		}
	}

	async fn bearer(&self) -> Result<String, RemoteError> {
		let mut guard = self.token.lock().await;
		if let Some(cached) = guard.as_ref()
			&& cached.expires_at > Instant::now()
		{
			return Ok(cached.token.clone());
		}

		debug!("Requesting new control-plane token");
		let response = self
			.http
			.post(format!("{}/oauth2/token", self.base_url))
			.form(&[
				("grant_type", "client_credentials"),
				("client_id", self.client_id.as_str()),
				("client_secret", self.client_secret.expose_secret()),
			])
			.send()
			.await?;
		let response = check(response).await?;
		let token: TokenResponse = response
			.json()
			.await
			.map_err(|err| RemoteError::Transport(err.to_string()))?;

		let expires_at = Instant::now()
			+ Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
		let value = token.access_token;
		*guard = Some(CachedToken {
			token: value.clone(),
			expires_at,
		});
		Ok(value)
	}

	async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
		let token = self.bearer().await?;
		let response = self
			.http
			.get(format!("{}{}", self.base_url, path))
			.bearer_auth(token)
			.send()
			.await?;
		let response = check(response).await?;
		response
			.json()
			.await
			.map_err(|err| RemoteError::Transport(err.to_string()))
	}

	fn file_url(&self, server_id: &str, path: &str) -> String {
		format!(
			"{}/daemon/server/{}/file/{}",
			self.base_url,
			server_id,
			path.trim_start_matches('/')
		)
	}
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
	let status = response.status();
	if status.is_success() {
		return Ok(response);
	}
	let message = response.text().await.unwrap_or_default();
	Err(RemoteError::Status {
		status: status.as_u16(),
		message: if message.is_empty() {
			status
				.canonical_reason()
				.unwrap_or("unknown error")
				.to_string()
		} else {
			message
		},
	})
}

#[async_trait]
impl PufferClient for HttpPufferClient {
	#[instrument(skip(self))]
	async fn get_server(&self, server_id: &str) -> Result<ServerRef, RemoteError> {
		self.get_json(&format!("/api/servers/{server_id}")).await
	}

	#[instrument(skip(self))]
	async fn get_definition(&self, server_id: &str) -> Result<ServerDefinition, RemoteError> {
		self.get_json(&format!("/api/servers/{server_id}/definition"))
			.await
	}

	#[instrument(skip(self))]
	async fn get_definition_raw(&self, server_id: &str) -> Result<serde_json::Value, RemoteError> {
		self.get_json(&format!("/api/servers/{server_id}/definition"))
			.await
	}

	#[instrument(skip(self))]
	async fn get_data(&self, server_id: &str) -> Result<serde_json::Value, RemoteError> {
		self.get_json(&format!("/api/servers/{server_id}/data")).await
	}

	#[instrument(skip(self))]
	async fn list_path(&self, server_id: &str, path: &str) -> Result<Vec<FileEntry>, RemoteError> {
		let token = self.bearer().await?;
		let response = self
			.http
			.get(self.file_url(server_id, &format!("{path}/")))
			.bearer_auth(token)
			.send()
			.await?;
		let response = check(response).await?;
		response
			.json()
			.await
			.map_err(|err| RemoteError::Transport(err.to_string()))
	}

	#[instrument(skip(self))]
	async fn fetch_file(&self, server_id: &str, path: &str) -> Result<Vec<u8>, RemoteError> {
		let token = self.bearer().await?;
		let response = self
			.http
			.get(self.file_url(server_id, path))
			.bearer_auth(token)
			.send()
			.await?;
		let response = check(response).await?;
		let bytes = response.bytes().await?;
		Ok(bytes.to_vec())
	}

	#[instrument(skip(self, bytes), fields(len = bytes.len()))]
	async fn put_file(
		&self,
		server_id: &str,
		path: &str,
		bytes: Vec<u8>,
	) -> Result<(), RemoteError> {
		let token = self.bearer().await?;
		let response = self
			.http
			.put(self.file_url(server_id, path))
			.bearer_auth(token)
			.body(bytes)
			.send()
			.await?;
		check(response).await?;
		Ok(())
	}

	#[instrument(skip(self))]
	async fn delete_file(&self, server_id: &str, path: &str) -> Result<(), RemoteError> {
		let token = self.bearer().await?;
		let response = self
			.http
			.delete(self.file_url(server_id, path))
			.bearer_auth(token)
			.send()
			.await?;
		if response.status() == StatusCode::NOT_FOUND {
			// The file is already gone, which is what we wanted.
			return Ok(());
		}
		check(response).await?;
		Ok(())
	}

	#[instrument(skip(self))]
	async fn list_servers(&self) -> Result<Vec<ServerRef>, RemoteError> {
		let mut cache = self.servers_cache.lock().await;
		if let Some((fetched_at, servers)) = cache.get(&self.base_url)
			&& fetched_at.elapsed() < SERVERS_CACHE_TTL
		{
			return Ok(servers.clone());
		}

		let page: ServerListPage = self.get_json("/api/servers?limit=100").await?;
		cache.insert(self.base_url.clone(), (Instant::now(), page.servers.clone()));
		Ok(page.servers)
	}
}
