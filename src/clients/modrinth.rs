//! Upstream catalog client.
//!
//! `CatalogClient` is the capability interface for project lookup,
//! version listing, search and slug resolution. The HTTP implementation
//! talks to the Modrinth v2 API, optionally authenticated.

use std::fmt;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::domain::error::{Error, ErrorKind};
use crate::domain::loader::Loader;
use crate::domain::mod_entry::Channel;

/// Typed error of the catalog boundary.
#[derive(Debug, Clone)]
pub enum CatalogError {
	Status { status: u16, message: String },
	Transport(String),
}

impl CatalogError {
	pub fn status(&self) -> Option<u16> {
		match self {
			CatalogError::Status { status, .. } => Some(*status),
			CatalogError::Transport(_) => None,
		}
	}

	pub fn is_not_found(&self) -> bool {
		self.status() == Some(404)
	}

	pub fn is_transient(&self) -> bool {
		match self {
			CatalogError::Status { status, .. } => *status == 429 || (500..=599).contains(status),
			CatalogError::Transport(_) => true,
		}
	}
}

impl fmt::Display for CatalogError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CatalogError::Status { status, message } => {
				write!(f, "catalog returned {status}: {message}")
			}
			CatalogError::Transport(message) => write!(f, "catalog unreachable: {message}"),
		}
	}
}

impl std::error::Error for CatalogError {}

impl From<reqwest::Error> for CatalogError {
	fn from(err: reqwest::Error) -> Self {
		CatalogError::Transport(err.to_string())
	}
}

impl From<CatalogError> for Error {
	fn from(err: CatalogError) -> Error {
		match err.status() {
			Some(401) | Some(403) => Error::unauthorized("catalog token required"),
			Some(404) => Error::not_found(err.to_string()),
			Some(429) => Error::too_many_requests("catalog rate limit exceeded"),
			Some(s) if (500..=599).contains(&s) => Error::bad_gateway(err.to_string()),
			Some(_) => (ErrorKind::BadRequest, "catalog rejected request", err.to_string()).into(),
			None => Error::bad_gateway(err.to_string()),
		}
	}
}

/// One catalog project.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Project {
	pub slug: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub icon_url: Option<String>,
	#[serde(default)]
	pub game_versions: Vec<String>,
	#[serde(default)]
	pub loaders: Vec<String>,
}

/// One published version of a project, newest first in listings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Version {
	pub id: String,
	#[serde(default)]
	pub name: String,
	pub version_number: String,
	#[serde(default)]
	pub version_type: String,
	#[serde(default)]
	pub game_versions: Vec<String>,
	#[serde(default)]
	pub loaders: Vec<String>,
	#[serde(default)]
	pub files: Vec<VersionFile>,
	#[serde(default)]
	pub date_published: String,
}

impl Version {
	pub fn channel(&self) -> Channel {
		Channel::parse(&self.version_type).unwrap_or_default()
	}

	pub fn primary_file(&self) -> Option<&VersionFile> {
		self.files
			.iter()
			.find(|f| f.primary)
			.or_else(|| self.files.first())
	}

	/// Loader priority for a freshly tracked mod: instance loader when it
	/// is a catalog id, else the loader derived from the file, else the
	/// first mapped loader in this version's list (the host game id is
	/// not a loader).
	pub fn pick_loader(&self, instance: Option<Loader>, derived: Option<Loader>) -> String {
		if let Some(l) = instance.filter(|l| l.is_catalog_loader()) {
			return l.id().to_string();
		}
		if let Some(l) = derived {
			return l.id().to_string();
		}
		self.loaders
			.iter()
			.filter(|l| l.as_str() != "minecraft")
			.find_map(|l| Loader::parse(l))
			.map(|l| l.id().to_string())
			.unwrap_or_default()
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VersionFile {
	pub url: String,
	#[serde(default)]
	pub filename: String,
	#[serde(default)]
	pub primary: bool,
	#[serde(default)]
	pub size: u64,
}

/// One search result hit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
	pub slug: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub icon_url: Option<String>,
}

#[derive(Deserialize)]
struct SearchPage {
	#[serde(default)]
	hits: Vec<SearchHit>,
}

/// Picks the available version for a channel setting: scan for the most
/// stable eligible channel first, then fall through to less stable ones.
pub fn pick_available<'a>(versions: &'a [Version], channel: Channel) -> Option<&'a Version> {
	channel
		.allowed()
		.iter()
		.find_map(|ch| versions.iter().find(|v| v.channel() == *ch))
}

/// Capability interface over the upstream catalog.
#[async_trait]
pub trait CatalogClient: Send + Sync {
	async fn project(&self, slug: &str) -> Result<Project, CatalogError>;
	/// Lists versions newest first. Empty `game_version`/`loader` skip
	/// the corresponding filter; an unrecognized loader drops both
	/// filters so a misspelled token cannot empty the listing.
	async fn versions(
		&self,
		slug: &str,
		game_version: &str,
		loader: &str,
	) -> Result<Vec<Version>, CatalogError>;
	async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CatalogError>;
	/// Resolves a slug-or-id candidate to its canonical project.
	async fn resolve(&self, candidate: &str) -> Result<Project, CatalogError>;
	/// Downloads an artifact from a version file URL.
	async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, CatalogError>;
}

/// HTTP implementation against the Modrinth v2 API.
pub struct HttpCatalogClient {
	http: reqwest::Client,
	base_url: String,
	token: Option<SecretString>,
}

impl HttpCatalogClient {
	pub fn new(base_url: &str, token: Option<SecretString>) -> Self {
		Self {
			http: reqwest::Client::new(),
			base_url: base_url.trim_end_matches('/').to_string(),
			token,
		}
	}

	async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, CatalogError> {
		let mut request = self.http.get(format!("{}{}", self.base_url, path));
		if let Some(token) = &self.token {
			request = request.header("Authorization", token.expose_secret());
		}
		let response = request.send().await?;
		let status = response.status();
		if !status.is_success() {
			let message = response.text().await.unwrap_or_default();
			return Err(CatalogError::Status {
				status: status.as_u16(),
				message,
			});
		}
		response
			.json()
			.await
			.map_err(|err| CatalogError::Transport(err.to_string()))
	}
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
	#[instrument(skip(self))]
	async fn project(&self, slug: &str) -> Result<Project, CatalogError> {
		self.get_json(&format!("/project/{slug}")).await
	}

	#[instrument(skip(self))]
	async fn versions(
		&self,
		slug: &str,
		game_version: &str,
		loader: &str,
	) -> Result<Vec<Version>, CatalogError> {
		let mut path = format!("/project/{slug}/version");
		let recognized = Loader::parse(loader).is_some_and(Loader::is_catalog_loader);
		// Guard clause: an unrecognized loader token would produce an
		// empty listing, so both facets are dropped.
		if recognized {
			path.push_str(&format!("?loaders=[\"{loader}\"]"));
			if !game_version.is_empty() {
				path.push_str(&format!("&game_versions=[\"{game_version}\"]"));
			}
		}
		self.get_json(&path).await
	}

	#[instrument(skip(self))]
	async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CatalogError> {
		let encoded: String = query
			.chars()
			.map(|c| if c == ' ' { '+' } else { c })
			.collect();
		let page: SearchPage = self
			.get_json(&format!("/search?query={encoded}&limit=10"))
			.await?;
		Ok(page.hits)
	}

	#[instrument(skip(self))]
	async fn resolve(&self, candidate: &str) -> Result<Project, CatalogError> {
		self.project(candidate).await
	}

	#[instrument(skip(self))]
	async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, CatalogError> {
		let response = self.http.get(url).send().await?;
		let status = response.status();
		if !status.is_success() {
			let message = response.text().await.unwrap_or_default();
			return Err(CatalogError::Status {
				status: status.as_u16(),
				message,
			});
		}
		let bytes = response.bytes().await?;
		Ok(bytes.to_vec())
	}
}

#[cfg(test)]
mod tests {
	use claims::{assert_none, assert_some};

	use super::*;

	fn version(number: &str, kind: &str) -> Version {
		Version {
			id: format!("id-{number}"),
			name: number.to_string(),
			version_number: number.to_string(),
			version_type: kind.to_string(),
			game_versions: vec!["1.20.1".into()],
			loaders: vec!["fabric".into()],
			files: vec![VersionFile {
				url: format!("https://cdn.example/{number}.jar"),
				filename: format!("{number}.jar"),
				primary: true,
				size: 1024,
			}],
			date_published: String::new(),
		}
	}

	#[test]
	fn release_channel_ignores_prereleases() {
		let versions = vec![version("2.0-beta", "beta"), version("1.9", "release")];
		let picked = pick_available(&versions, Channel::Release);
		assert_eq!(assert_some!(picked).version_number, "1.9");
	}

	#[test]
	fn beta_channel_prefers_release_over_newer_beta() {
		let versions = vec![version("2.0-beta", "beta"), version("1.9", "release")];
		let picked = pick_available(&versions, Channel::Beta);
		assert_eq!(assert_some!(picked).version_number, "1.9");
	}

	#[test]
	fn beta_channel_falls_back_to_beta_when_no_release_exists() {
		let versions = vec![version("2.0-beta", "beta"), version("2.1-alpha", "alpha")];
		let picked = pick_available(&versions, Channel::Beta);
		assert_eq!(assert_some!(picked).version_number, "2.0-beta");
		assert_none!(pick_available(&versions, Channel::Release));
	}

	#[test]
	fn loader_priority_prefers_instance_then_derived_then_version_list() {
		let v = version("1.0", "release");
		assert_eq!(v.pick_loader(Some(Loader::Forge), Some(Loader::Quilt)), "forge");
		assert_eq!(v.pick_loader(None, Some(Loader::Quilt)), "quilt");
		assert_eq!(v.pick_loader(None, None), "fabric");
		// Pack taxonomies are not catalog loaders; fall through.
		assert_eq!(v.pick_loader(Some(Loader::Resourcepack), None), "fabric");
	}

	#[test]
	fn primary_file_falls_back_to_first() {
		let mut v = version("1.0", "release");
		v.files[0].primary = false;
		assert_eq!(assert_some!(v.primary_file()).filename, "1.0.jar");
	}
}
