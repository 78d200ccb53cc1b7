use chrono::{DateTime, Utc};
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};

use crate::schema::mods;

pub type ModKey = i64;

/// Release channel of a tracked mod. Determines which catalog versions
/// are eligible when computing the available version.
#[derive(
	AsExpression,
	FromSqlRow,
	Serialize,
	Deserialize,
	Debug,
	Clone,
	Copy,
	Default,
	PartialEq,
	Eq,
	Hash,
	PartialOrd,
	Ord,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
	#[default]
	Release,
	Beta,
	Alpha,
}

impl Channel {
	pub fn as_str(self) -> &'static str {
		match self {
			Channel::Release => "release",
			Channel::Beta => "beta",
			Channel::Alpha => "alpha",
		}
	}

	pub fn parse(s: &str) -> Option<Channel> {
		match s {
			"release" => Some(Channel::Release),
			"beta" => Some(Channel::Beta),
			"alpha" => Some(Channel::Alpha),
			_ => None,
		}
	}

	/// Channels eligible for this channel setting, most stable first.
	pub fn allowed(self) -> &'static [Channel] {
		match self {
			Channel::Release => &[Channel::Release],
			Channel::Beta => &[Channel::Release, Channel::Beta],
			Channel::Alpha => &[Channel::Release, Channel::Beta, Channel::Alpha],
		}
	}
}

impl ToSql<Text, Sqlite> for Channel {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.as_str());
		Ok(IsNull::No)
	}
}

impl FromSql<Text, Sqlite> for Channel {
	fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
		let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
		Channel::parse(&s).ok_or_else(|| format!("Unrecognized channel: {s}").into())
	}
}

/// A tracked catalog entry installed to an instance.
#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = mods)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Mod {
	pub id: ModKey,
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
	pub installed_file: String,
	pub installed_version: String,
	pub created_at: DateTime<Utc>,
}

impl Mod {
	pub fn is_up_to_date(&self) -> bool {
		self.available_version == self.current_version
	}

	/// Catalog slug parsed out of the canonical `/mod/<slug>` URL.
	pub fn slug(&self) -> Option<&str> {
		let trimmed = self.url.trim_end_matches('/');
		let (_, slug) = trimmed.rsplit_once("/mod/")?;
		if slug.is_empty() || slug.contains('/') {
			return None;
		}
		Some(slug)
	}
}

/// Canonical catalog URL for a project slug.
pub fn canonical_url(slug: &str) -> String {
	format!("https://modrinth.com/mod/{slug}")
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = mods)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewMod {
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
	pub installed_file: String,
	pub installed_version: String,
	pub created_at: DateTime<Utc>,
}

/// Partial changeset; `None` fields are left untouched.
#[derive(AsChangeset, Default, Debug, Clone)]
#[diesel(table_name = mods)]
pub struct ModChanges {
	pub name: Option<String>,
	pub icon_url: Option<String>,
	pub game_version: Option<String>,
	pub loader: Option<String>,
	pub channel: Option<Channel>,
	pub current_version: Option<String>,
	pub available_version: Option<String>,
	pub available_channel: Option<String>,
	pub download_url: Option<String>,
	pub installed_file: Option<String>,
	pub installed_version: Option<String>,
	pub instance_id: Option<i64>,
}

impl ModChanges {
	/// An all-`None` changeset cannot be applied; callers skip the write.
	pub fn is_empty(&self) -> bool {
		self.name.is_none()
			&& self.icon_url.is_none()
			&& self.game_version.is_none()
			&& self.loader.is_none()
			&& self.channel.is_none()
			&& self.current_version.is_none()
			&& self.available_version.is_none()
			&& self.available_channel.is_none()
			&& self.download_url.is_none()
			&& self.installed_file.is_none()
			&& self.installed_version.is_none()
			&& self.instance_id.is_none()
	}
}

#[cfg(test)]
mod tests {
	use claims::{assert_none, assert_some_eq};

	use super::*;

	#[test]
	fn channel_eligibility_is_stable_first() {
		assert_eq!(Channel::Release.allowed(), &[Channel::Release]);
		assert_eq!(Channel::Beta.allowed(), &[Channel::Release, Channel::Beta]);
		assert_eq!(
			Channel::Alpha.allowed(),
			&[Channel::Release, Channel::Beta, Channel::Alpha]
		);
	}

	#[test]
	fn slug_parses_from_canonical_url() {
		let mut entry = Mod {
			id: 1,
			instance_id: 1,
			name: "Sodium".into(),
			icon_url: String::new(),
			url: canonical_url("sodium"),
			game_version: String::new(),
			loader: "fabric".into(),
			channel: Channel::Release,
			current_version: "0.5.8".into(),
			available_version: "0.5.8".into(),
			available_channel: "release".into(),
			download_url: String::new(),
			installed_file: String::new(),
			installed_version: String::new(),
			created_at: Utc::now(),
		};
		assert_some_eq!(entry.slug(), "sodium");
		assert!(entry.is_up_to_date());

		entry.url = "https://example.com/whatever".into();
		assert_none!(entry.slug());
	}
}
