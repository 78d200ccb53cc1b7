use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct SecretPayload {
	pub value: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SecretStatusBody {
	pub configured: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub last4: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PufferTestPayload {
	pub base_url: String,
	pub client_id: String,
	pub client_secret: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PufferTestBody {
	pub ok: bool,
	pub servers: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct OkBody {
	pub ok: bool,
}
