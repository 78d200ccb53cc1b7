use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::Event;

/// Aggregate counters plus the latest applied updates.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DashboardBody {
	pub instances: i64,
	pub tracked: i64,
	pub up_to_date: i64,
	pub outdated: i64,
	pub recent_updates: Vec<RecentUpdateBody>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RecentUpdateBody {
	pub mod_id: Option<i64>,
	pub instance_id: i64,
	pub name: String,
	pub from_version: String,
	pub to_version: String,
	pub at: DateTime<Utc>,
}

impl From<Event> for RecentUpdateBody {
	fn from(event: Event) -> Self {
		Self {
			mod_id: event.mod_id,
			instance_id: event.instance_id,
			name: event.name,
			from_version: event.from_version,
			to_version: event.to_version,
			at: event.created_at,
		}
	}
}
