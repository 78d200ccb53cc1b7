use serde::{Deserialize, Serialize};

use crate::clients::modrinth::{Project, Version};
use crate::domain::mod_entry::{Channel, Mod};
use crate::jobs::JobId;

/// Wire projection of a tracked mod.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ModBody {
	pub id: i64,
	pub instance_id: i64,
	pub name: String,
	pub icon_url: String,
	pub url: String,
	pub game_version: String,
	pub loader: String,
	pub channel: Channel,
	pub current_version: String,
	pub available_version: String,
	pub available_channel: String,
	pub download_url: String,
	pub up_to_date: bool,
}

impl From<Mod> for ModBody {
	fn from(entry: Mod) -> Self {
		let up_to_date = entry.is_up_to_date();
		Self {
			id: entry.id,
			instance_id: entry.instance_id,
			name: entry.name,
			icon_url: entry.icon_url,
			url: entry.url,
			game_version: entry.game_version,
			loader: entry.loader,
			channel: entry.channel,
			current_version: entry.current_version,
			available_version: entry.available_version,
			available_channel: entry.available_channel,
			download_url: entry.download_url,
			up_to_date,
		}
	}
}

pub type ModListBody = Vec<ModBody>;

#[derive(Deserialize, Debug)]
pub struct ModListParams {
	pub instance_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct ModDeleteParams {
	pub instance_id: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MetadataPayload {
	pub url: String,
}

/// Catalog metadata for a project URL: everything the front-end needs to
/// drive version pickers.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MetadataBody {
	pub slug: String,
	pub name: String,
	pub icon_url: Option<String>,
	pub game_versions: Vec<String>,
	pub loaders: Vec<String>,
	pub channels: Vec<String>,
	pub versions: Vec<AnnotatedVersion>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedVersion {
	pub id: String,
	pub version_number: String,
	pub channel: String,
	pub game_versions: Vec<String>,
	pub loaders: Vec<String>,
	pub download_url: Option<String>,
	pub is_newest: bool,
	pub is_prerelease: bool,
}

impl MetadataBody {
	pub fn from_catalog(project: Project, versions: &[Version]) -> Self {
		let mut game_versions: Vec<String> = Vec::new();
		let mut loaders: Vec<String> = Vec::new();
		let mut channels: Vec<String> = Vec::new();
		for version in versions {
			for gv in &version.game_versions {
				if !game_versions.contains(gv) {
					game_versions.push(gv.clone());
				}
			}
			for l in &version.loaders {
				if !loaders.contains(l) {
					loaders.push(l.clone());
				}
			}
			let channel = version.channel().as_str().to_string();
			if !channels.contains(&channel) {
				channels.push(channel);
			}
		}
		let annotated = versions
			.iter()
			.enumerate()
			.map(|(i, v)| AnnotatedVersion {
				id: v.id.clone(),
				version_number: v.version_number.clone(),
				channel: v.channel().as_str().to_string(),
				game_versions: v.game_versions.clone(),
				loaders: v.loaders.clone(),
				download_url: v.primary_file().map(|f| f.url.clone()),
				is_newest: i == 0,
				is_prerelease: v.channel() != crate::domain::mod_entry::Channel::Release,
			})
			.collect();
		Self {
			slug: project.slug,
			name: project.title,
			icon_url: project.icon_url,
			game_versions,
			loaders,
			channels,
			versions: annotated,
		}
	}
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NewModPayload {
	pub instance_id: i64,
	pub url: String,
	#[serde(default)]
	pub channel: Option<Channel>,
	/// Exact catalog version selection; newest eligible otherwise.
	#[serde(default)]
	pub version_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateModPayload {
	pub name: Option<String>,
	pub channel: Option<Channel>,
	pub game_version: Option<String>,
	pub loader: Option<String>,
}

/// Dry-run refresh result for the check endpoint.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CheckBody {
	pub current_version: String,
	pub available_version: String,
	pub available_channel: String,
	pub up_to_date: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UpdateAsyncPayload {
	pub idempotency_key: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UpdateAsyncBody {
	pub job_id: JobId,
}
