use chrono::{DateTime, Utc};
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};

use crate::schema::sync_jobs;

pub type SyncJobKey = i64;

/// Lifecycle of a durable job row. Transitions are monotonic except
/// `Running -> Queued` on crash recovery.
#[derive(
	AsExpression, FromSqlRow, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
	Queued,
	Running,
	Succeeded,
	Failed,
	Canceled,
}

impl JobStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			JobStatus::Queued => "queued",
			JobStatus::Running => "running",
			JobStatus::Succeeded => "succeeded",
			JobStatus::Failed => "failed",
			JobStatus::Canceled => "canceled",
		}
	}

	pub fn is_terminal(self) -> bool {
		matches!(
			self,
			JobStatus::Succeeded | JobStatus::Failed | JobStatus::Canceled
		)
	}
}

impl ToSql<Text, Sqlite> for JobStatus {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.as_str());
		Ok(IsNull::No)
	}
}

impl FromSql<Text, Sqlite> for JobStatus {
	fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
		let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
		match s.as_str() {
			"queued" => Ok(JobStatus::Queued),
			"running" => Ok(JobStatus::Running),
			"succeeded" => Ok(JobStatus::Succeeded),
			"failed" => Ok(JobStatus::Failed),
			"canceled" => Ok(JobStatus::Canceled),
			other => Err(format!("Unrecognized job status: {other}").into()),
		}
	}
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = sync_jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncJob {
	pub id: SyncJobKey,
	pub instance_id: i64,
	pub server_id: String,
	pub status: JobStatus,
	pub idempotency_key: String,
	pub started_at: Option<DateTime<Utc>>,
	pub finished_at: Option<DateTime<Utc>>,
	pub error: Option<String>,
	pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = sync_jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewSyncJob {
	pub instance_id: i64,
	pub server_id: String,
	pub status: JobStatus,
	pub idempotency_key: String,
	pub created_at: DateTime<Utc>,
}

impl NewSyncJob {
	pub fn queued(instance_id: i64, server_id: String, idempotency_key: String) -> Self {
		Self {
			instance_id,
			server_id,
			status: JobStatus::Queued,
			idempotency_key,
			created_at: Utc::now(),
		}
	}
}
