use tracing::warn;

use crate::domain::instance::Instance;
use crate::{Error, Result};

pub mod dashboard;
pub mod instances;
pub mod jobs;
pub mod mods;
pub mod settings;

pub mod routes {
	pub use super::dashboard::routes::dashboard_routes;
	pub use super::instances::routes::instance_routes;
	pub use super::jobs::routes::job_routes;
	pub use super::mods::routes::mod_routes;
	pub use super::settings::routes::settings_routes;
}

/// Refuses mod-mutating actions while an instance is gated on loader
/// selection.
pub(crate) fn ensure_loader_not_required(instance: &Instance, action: &str) -> Result<()> {
	if instance.requires_loader {
		warn!(instance_id = instance.id, action, "action_blocked");
		return Err(Error::loader_required());
	}
	Ok(())
}
