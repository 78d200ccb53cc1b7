use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::instance::{Instance, InstanceStats, LoaderStatus};
use crate::jobs::JobId;

/// Wire projection of an instance.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InstanceBody {
	pub id: i64,
	pub name: String,
	pub loader: String,
	pub loader_status: LoaderStatus,
	pub loader_required: bool,
	pub pufferpanel_server_id: String,
	pub game_version: String,
	pub puffer_version_key: String,
	pub created_at: DateTime<Utc>,
	pub last_sync_at: Option<DateTime<Utc>>,
	pub stats: InstanceStats,
}

impl InstanceBody {
	pub fn from_parts(instance: Instance, stats: InstanceStats) -> Self {
		Self {
			id: instance.id,
			loader_status: instance.loader_status(),
			name: instance.name,
			loader: instance.loader,
			loader_required: instance.requires_loader,
			pufferpanel_server_id: instance.pufferpanel_server_id,
			game_version: instance.game_version,
			puffer_version_key: instance.puffer_version_key,
			created_at: instance.created_at,
			last_sync_at: instance.last_sync_at,
			stats,
		}
	}
}

pub type InstanceListBody = Vec<InstanceBody>;

/// Body shared by validate and create. The server id is accepted both in
/// camelCase and under its historical snake_case name.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewInstancePayload {
	pub name: Option<String>,
	pub loader: Option<String>,
	#[serde(alias = "pufferpanel_server_id")]
	pub server_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInstancePayload {
	pub name: Option<String>,
	pub loader: Option<String>,
	pub game_version: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct DeleteInstanceParams {
	pub target_instance_id: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequestPayload {
	#[serde(alias = "pufferpanel_server_id")]
	pub server_id: Option<String>,
	pub key: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct EnqueuedBody {
	pub id: JobId,
	pub status: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ValidationOkBody {
	pub ok: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SyncAllBody {
	pub created: usize,
	pub total: usize,
}
