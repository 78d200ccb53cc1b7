use serde::{Deserialize, Serialize};

use crate::jobs::JobId;

#[derive(Serialize, Deserialize, Debug)]
pub struct RetriedBody {
	pub id: JobId,
}
