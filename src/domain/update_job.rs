use chrono::{DateTime, Utc};
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};

use crate::schema::mod_updates;

pub type UpdateJobKey = i64;

/// State machine of the two-phase update executor.
///
/// Forward path: Queued -> Running -> UploadingNew -> VerifyingNew ->
/// RemovingOld -> VerifyingRemoval -> UpdatingDb -> Succeeded. Terminal
/// states are Succeeded, Failed, PartialSuccess and Canceled; a job may
/// be canceled between any two states.
#[derive(
	AsExpression, FromSqlRow, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
	Queued,
	Running,
	UploadingNew,
	VerifyingNew,
	RemovingOld,
	VerifyingRemoval,
	UpdatingDb,
	Succeeded,
	Failed,
	PartialSuccess,
	Canceled,
}

impl UpdateState {
	pub fn as_str(self) -> &'static str {
		match self {
			UpdateState::Queued => "queued",
			UpdateState::Running => "running",
			UpdateState::UploadingNew => "uploading_new",
			UpdateState::VerifyingNew => "verifying_new",
			UpdateState::RemovingOld => "removing_old",
			UpdateState::VerifyingRemoval => "verifying_removal",
			UpdateState::UpdatingDb => "updating_db",
			UpdateState::Succeeded => "succeeded",
			UpdateState::Failed => "failed",
			UpdateState::PartialSuccess => "partial_success",
			UpdateState::Canceled => "canceled",
		}
	}

	pub fn parse(s: &str) -> Option<UpdateState> {
		Some(match s {
			"queued" => UpdateState::Queued,
			"running" => UpdateState::Running,
			"uploading_new" => UpdateState::UploadingNew,
			"verifying_new" => UpdateState::VerifyingNew,
			"removing_old" => UpdateState::RemovingOld,
			"verifying_removal" => UpdateState::VerifyingRemoval,
			"updating_db" => UpdateState::UpdatingDb,
			"succeeded" => UpdateState::Succeeded,
			"failed" => UpdateState::Failed,
			"partial_success" => UpdateState::PartialSuccess,
			"canceled" => UpdateState::Canceled,
			_ => return None,
		})
	}

	pub fn is_terminal(self) -> bool {
		matches!(
			self,
			UpdateState::Succeeded
				| UpdateState::Failed
				| UpdateState::PartialSuccess
				| UpdateState::Canceled
		)
	}

	/// Whether `self -> next` is a legal transition. Total over the state
	/// set; illegal moves return false.
	pub fn can_transition(self, next: UpdateState) -> bool {
		use UpdateState::*;
		if self.is_terminal() {
			return false;
		}
		// Cancellation and failure are reachable from any live state.
		if matches!(next, Canceled | Failed) {
			return true;
		}
		match (self, next) {
			(Queued, Running) => true,
			(Running, UploadingNew) => true,
			// Short-circuits: already-current detection and overwrite
			// installs skip ahead.
			(Running, Succeeded) => true,
			(VerifyingNew, Succeeded) => true,
			(UploadingNew, VerifyingNew) => true,
			(VerifyingNew, RemovingOld) => true,
			(VerifyingNew, UpdatingDb) => true,
			(RemovingOld, VerifyingRemoval) => true,
			(VerifyingRemoval, UpdatingDb) => true,
			(VerifyingRemoval, PartialSuccess) => true,
			(UpdatingDb, Succeeded) => true,
			_ => false,
		}
	}
}

impl ToSql<Text, Sqlite> for UpdateState {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.as_str());
		Ok(IsNull::No)
	}
}

impl FromSql<Text, Sqlite> for UpdateState {
	fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
		let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
		UpdateState::parse(&s).ok_or_else(|| format!("Unrecognized update state: {s}").into())
	}
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = mod_updates)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UpdateJob {
	pub id: UpdateJobKey,
	pub mod_id: i64,
	pub from_version: String,
	pub to_version: String,
	pub status: UpdateState,
	pub idempotency_key: String,
	pub error: Option<String>,
	pub created_at: DateTime<Utc>,
	pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = mod_updates)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewUpdateJob {
	pub mod_id: i64,
	pub from_version: String,
	pub to_version: String,
	pub status: UpdateState,
	pub idempotency_key: String,
	pub created_at: DateTime<Utc>,
}

impl NewUpdateJob {
	pub fn queued(mod_id: i64, from: String, to: String, idempotency_key: String) -> Self {
		Self {
			mod_id,
			from_version: from,
			to_version: to,
			status: UpdateState::Queued,
			idempotency_key,
			created_at: Utc::now(),
		}
	}
}
