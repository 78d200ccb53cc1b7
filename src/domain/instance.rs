use chrono::{DateTime, Utc};
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::domain::loader::Loader;
use crate::schema::instances;
use crate::{Error, ErrorKind, Result};

pub type InstanceKey = i64;

/// A validated instance display name.
///
/// Wraps a `String`; trimmed, bounded in grapheme count and free of
/// control characters.
#[derive(AsExpression, Debug, Clone, PartialEq, Eq)]
#[diesel(sql_type = Text)]
pub struct InstanceName(String);

impl InstanceName {
	/// Attempts to create a new `InstanceName`, validating the input.
	///
	/// # Validation Rules
	/// - Must not be empty or only whitespace (input is trimmed)
	/// - Must not exceed `max_graphemes` graphemes in length
	/// - Must not contain control characters
	pub fn parse(s: impl AsRef<str>, max_graphemes: usize) -> Result<InstanceName> {
		let trimmed = s.as_ref().trim();

		if trimmed.is_empty() {
			return Err((ErrorKind::BadRequest, "instance name must not be empty").into());
		}
		// A grapheme is a "user-perceived" character; counting graphemes
		// rather than bytes keeps the cap meaningful for non-ASCII names.
		if trimmed.graphemes(true).count() > max_graphemes {
			return Err((
				ErrorKind::BadRequest,
				"instance name too long",
				format!("limit is {max_graphemes} characters"),
			)
				.into());
		}
		if trimmed.chars().any(char::is_control) {
			return Err((
				ErrorKind::BadRequest,
				"instance name must not contain control characters",
			)
				.into());
		}

		Ok(Self(trimmed.to_string()))
	}

	/// Builds a name from an untrusted remote display string, truncating
	/// instead of rejecting. Used when auto-creating instances from the
	/// remote server list.
	pub fn truncated(s: impl AsRef<str>, max_graphemes: usize) -> Result<InstanceName> {
		let cleaned: String = s
			.as_ref()
			.chars()
			.filter(|c| !c.is_control())
			.collect::<String>()
			.trim()
			.graphemes(true)
			.take(max_graphemes)
			.collect();
		if cleaned.is_empty() {
			return Err((ErrorKind::BadRequest, "remote server has no usable name").into());
		}
		InstanceName::parse(cleaned, max_graphemes)
	}

	pub fn into_inner(self) -> String {
		self.0
	}
}

impl AsRef<str> for InstanceName {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl ToSql<Text, Sqlite> for InstanceName {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.0.as_str());
		Ok(IsNull::No)
	}
}

/// How the instance got its loader. Drives the `loaderStatus` projection.
#[derive(AsExpression, FromSqlRow, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum LoaderSource {
	Unset,
	Detected,
	User,
}

impl LoaderSource {
	fn as_str(self) -> &'static str {
		match self {
			LoaderSource::Unset => "",
			LoaderSource::Detected => "detected",
			LoaderSource::User => "user",
		}
	}
}

impl ToSql<Text, Sqlite> for LoaderSource {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.as_str());
		Ok(IsNull::No)
	}
}

impl FromSql<Text, Sqlite> for LoaderSource {
	fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
		let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
		match s.as_str() {
			"" => Ok(LoaderSource::Unset),
			"detected" => Ok(LoaderSource::Detected),
			"user" => Ok(LoaderSource::User),
			other => Err(format!("Unrecognized loader source: {other}").into()),
		}
	}
}

/// Wire projection of loader provenance.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoaderStatus {
	Known,
	UserSet,
	Unknown,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = instances)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Instance {
	pub id: InstanceKey,
	pub name: String,
	pub loader: String,
	pub loader_source: LoaderSource,
	pub pufferpanel_server_id: String,
	pub requires_loader: bool,
	pub puffer_version_key: String,
	pub game_version: String,
	pub created_at: DateTime<Utc>,
	pub last_sync_at: Option<DateTime<Utc>>,
}

impl Instance {
	pub fn parsed_loader(&self) -> Option<Loader> {
		Loader::parse(&self.loader)
	}

	pub fn loader_status(&self) -> LoaderStatus {
		if self.loader.is_empty() {
			return LoaderStatus::Unknown;
		}
		match self.loader_source {
			LoaderSource::User => LoaderStatus::UserSet,
			_ => LoaderStatus::Known,
		}
	}
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = instances)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewInstance {
	pub name: InstanceName,
	pub loader: String,
	pub loader_source: LoaderSource,
	pub pufferpanel_server_id: String,
	pub requires_loader: bool,
	pub puffer_version_key: String,
	pub game_version: String,
	pub created_at: DateTime<Utc>,
}

impl NewInstance {
	pub fn new(name: InstanceName, loader: Option<Loader>, server_id: String) -> Self {
		let (loader, loader_source) = match loader {
			Some(l) => (l.id().to_string(), LoaderSource::User),
			None => (String::new(), LoaderSource::Unset),
		};
		Self {
			name,
			loader,
			loader_source,
			pufferpanel_server_id: server_id,
			requires_loader: false,
			puffer_version_key: String::new(),
			game_version: String::new(),
			created_at: Utc::now(),
		}
	}
}

/// Partial changeset; `None` fields are left untouched.
#[derive(AsChangeset, Default, Debug, Clone)]
#[diesel(table_name = instances)]
pub struct InstanceChanges {
	pub name: Option<String>,
	pub loader: Option<String>,
	pub loader_source: Option<LoaderSource>,
	pub requires_loader: Option<bool>,
	pub puffer_version_key: Option<String>,
	pub game_version: Option<String>,
	pub last_sync_at: Option<DateTime<Utc>>,
}

impl InstanceChanges {
	/// An all-`None` changeset cannot be applied; callers skip the write.
	pub fn is_empty(&self) -> bool {
		self.name.is_none()
			&& self.loader.is_none()
			&& self.loader_source.is_none()
			&& self.requires_loader.is_none()
			&& self.puffer_version_key.is_none()
			&& self.game_version.is_none()
			&& self.last_sync_at.is_none()
	}
}

/// Aggregate mod counters for one instance.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstanceStats {
	pub tracked: i64,
	pub up_to_date: i64,
	pub outdated: i64,
}

#[cfg(test)]
mod tests {
	use claims::{assert_err, assert_ok};

	use super::*;

	#[test]
	fn a_120_grapheme_long_name_is_valid() {
		let name = "ё".repeat(120);
		assert_ok!(InstanceName::parse(name, 120));
	}

	#[test]
	fn a_name_longer_than_the_cap_is_rejected() {
		let name = "a".repeat(121);
		assert_err!(InstanceName::parse(name, 120));
	}

	#[test]
	fn whitespace_only_names_are_rejected() {
		assert_err!(InstanceName::parse("   ", 120));
		assert_err!(InstanceName::parse("", 120));
	}

	#[test]
	fn control_characters_are_rejected() {
		assert_err!(InstanceName::parse("creative\u{0007}", 120));
		assert_err!(InstanceName::parse("one\ntwo", 120));
	}

	#[test]
	fn names_are_trimmed() {
		let name = InstanceName::parse("  Skyblock SMP  ", 120).unwrap();
		assert_eq!(name.as_ref(), "Skyblock SMP");
	}

	#[test]
	fn truncated_cuts_to_the_grapheme_cap() {
		let name = InstanceName::truncated("abcdef", 4).unwrap();
		assert_eq!(name.as_ref(), "abcd");
	}

	#[test]
	fn loader_status_projection() {
		let mut instance = Instance {
			id: 1,
			name: "x".into(),
			loader: String::new(),
			loader_source: LoaderSource::Unset,
			pufferpanel_server_id: "srv".into(),
			requires_loader: false,
			puffer_version_key: String::new(),
			game_version: String::new(),
			created_at: Utc::now(),
			last_sync_at: None,
		};
		assert_eq!(instance.loader_status(), LoaderStatus::Unknown);

		instance.loader = "fabric".into();
		instance.loader_source = LoaderSource::Detected;
		assert_eq!(instance.loader_status(), LoaderStatus::Known);

		instance.loader_source = LoaderSource::User;
		assert_eq!(instance.loader_status(), LoaderStatus::UserSet);
	}
}
