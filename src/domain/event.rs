use chrono::{DateTime, Utc};
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};

use crate::schema::events;

/// What happened to a tracked mod. Events are append-only audit rows.
#[derive(
	AsExpression, FromSqlRow, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
	Added,
	Updated,
	Deleted,
}

impl EventAction {
	pub fn as_str(self) -> &'static str {
		match self {
			EventAction::Added => "added",
			EventAction::Updated => "updated",
			EventAction::Deleted => "deleted",
		}
	}
}

impl ToSql<Text, Sqlite> for EventAction {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.as_str());
		Ok(IsNull::No)
	}
}

impl FromSql<Text, Sqlite> for EventAction {
	fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
		let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
		match s.as_str() {
			"added" => Ok(EventAction::Added),
			"updated" => Ok(EventAction::Updated),
			"deleted" => Ok(EventAction::Deleted),
			other => Err(format!("Unrecognized event action: {other}").into()),
		}
	}
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Event {
	pub id: i64,
	pub instance_id: i64,
	pub mod_id: Option<i64>,
	pub action: EventAction,
	pub name: String,
	pub from_version: String,
	pub to_version: String,
	pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewEvent {
	pub instance_id: i64,
	pub mod_id: Option<i64>,
	pub action: EventAction,
	pub name: String,
	pub from_version: String,
	pub to_version: String,
	pub created_at: DateTime<Utc>,
}

impl NewEvent {
	pub fn added(instance_id: i64, mod_id: i64, name: &str, version: &str) -> Self {
		Self {
			instance_id,
			mod_id: Some(mod_id),
			action: EventAction::Added,
			name: name.to_string(),
			from_version: String::new(),
			to_version: version.to_string(),
			created_at: Utc::now(),
		}
	}

	pub fn updated(instance_id: i64, mod_id: i64, name: &str, from: &str, to: &str) -> Self {
		Self {
			instance_id,
			mod_id: Some(mod_id),
			action: EventAction::Updated,
			name: name.to_string(),
			from_version: from.to_string(),
			to_version: to.to_string(),
			created_at: Utc::now(),
		}
	}

	pub fn deleted(instance_id: i64, mod_id: i64, name: &str, version: &str) -> Self {
		Self {
			instance_id,
			mod_id: Some(mod_id),
			action: EventAction::Deleted,
			name: name.to_string(),
			from_version: version.to_string(),
			to_version: String::new(),
			created_at: Utc::now(),
		}
	}
}
