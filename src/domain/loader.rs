use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Mod runtime (fabric/forge/neoforge/quilt), plugin flavor
/// (paper/spigot/bukkit) or pack taxonomy for a server instance.
#[derive(
	AsRefStr,
	Display,
	EnumIter,
	EnumString,
	Serialize,
	Deserialize,
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	Hash,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Loader {
	Fabric,
	Forge,
	Neoforge,
	Quilt,
	Paper,
	Spigot,
	Bukkit,
	Datapack,
	Resourcepack,
}

impl Loader {
	/// Canonical lowercase id as used by the catalog.
	pub fn id(self) -> &'static str {
		match self {
			Loader::Fabric => "fabric",
			Loader::Forge => "forge",
			Loader::Neoforge => "neoforge",
			Loader::Quilt => "quilt",
			Loader::Paper => "paper",
			Loader::Spigot => "spigot",
			Loader::Bukkit => "bukkit",
			Loader::Datapack => "datapack",
			Loader::Resourcepack => "resourcepack",
		}
	}

	/// Human display name as it appears in server templates.
	pub fn display_name(self) -> &'static str {
		match self {
			Loader::Fabric => "Fabric",
			Loader::Forge => "Forge",
			Loader::Neoforge => "NeoForge",
			Loader::Quilt => "Quilt",
			Loader::Paper => "Paper",
			Loader::Spigot => "Spigot",
			Loader::Bukkit => "Bukkit",
			Loader::Datapack => "Data Pack",
			Loader::Resourcepack => "Resource Pack",
		}
	}

	/// Remote folder holding the managed jars for this loader.
	pub fn folder(self) -> &'static str {
		if self.is_plugin_host() { "plugins" } else { "mods" }
	}

	pub fn is_plugin_host(self) -> bool {
		matches!(self, Loader::Paper | Loader::Spigot | Loader::Bukkit)
	}

	/// Loader ids the catalog accepts as a `loaders` facet. Pack
	/// taxonomies are tracked locally but are not catalog loader ids.
	pub fn is_catalog_loader(self) -> bool {
		!matches!(self, Loader::Datapack | Loader::Resourcepack)
	}

	pub fn parse(s: &str) -> Option<Loader> {
		s.parse().ok()
	}
}

#[cfg(test)]
mod tests {
	use claims::{assert_none, assert_some_eq};
	use strum::IntoEnumIterator;

	use super::*;

	#[test]
	fn folder_is_plugins_for_plugin_hosts_only() {
		for loader in Loader::iter() {
			let expected = matches!(loader, Loader::Paper | Loader::Spigot | Loader::Bukkit);
			assert_eq!(loader.folder() == "plugins", expected, "{loader}");
		}
	}

	#[test]
	fn parses_canonical_ids() {
		assert_some_eq!(Loader::parse("neoforge"), Loader::Neoforge);
		assert_some_eq!(Loader::parse("fabric"), Loader::Fabric);
		assert_none!(Loader::parse("gregtech"));
		assert_none!(Loader::parse(""));
	}

	#[test]
	fn id_round_trips_through_display() {
		for loader in Loader::iter() {
			assert_eq!(loader.to_string(), loader.id());
			assert_some_eq!(Loader::parse(loader.id()), loader);
		}
	}
}
