use std::env;
use std::net::IpAddr;

use secrecy::SecretString;

use crate::Result;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub pufferpanel: PufferPanelSettings,
    pub modrinth: ModrinthSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default = "default_name_cap")]
    pub instance_name_max_graphemes: usize,
    #[serde(skip, default)]
    pub env: EnvFlags,
}

#[derive(serde::Deserialize, Clone)]
pub struct ServerSettings {
    pub axum_host: IpAddr,
    pub axum_port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub path: String,
    pub pool_size: Option<u32>,
}

#[derive(serde::Deserialize, Clone)]
pub struct PufferPanelSettings {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(serde::Deserialize, Clone)]
pub struct ModrinthSettings {
    pub base_url: String,
    #[serde(default)]
    pub token: String,
}

impl ModrinthSettings {
    pub fn token(&self) -> Option<SecretString> {
        if self.token.is_empty() {
            None
        } else {
            Some(SecretString::from(self.token.clone()))
        }
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct SchedulerSettings {
    #[serde(default = "default_global_limit")]
    pub global_limit: usize,
    #[serde(default = "default_per_instance_limit")]
    pub per_instance_limit: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            global_limit: default_global_limit(),
            per_instance_limit: default_per_instance_limit(),
            queue_capacity: default_queue_capacity(),
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct LoggingSettings {
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_log_filename")]
    pub filename: String,
    /// Rotated files kept next to the live one.
    #[serde(default = "default_log_keep")]
    pub keep_old_files: usize,
    #[serde(default = "default_log_size_mib")]
    pub max_file_size_mib: u64,
    /// Filter applied when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub default_filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            filename: default_log_filename(),
            keep_old_files: default_log_keep(),
            max_file_size_mib: default_log_size_mib(),
            default_filter: default_log_filter(),
        }
    }
}

/// Flags sourced from the process environment rather than the file.
#[derive(Clone, Default)]
pub struct EnvFlags {
    /// Enables the bearer-auth middleware when set.
    pub admin_token: Option<SecretString>,
    /// `APP_ENV=production` switches on the nonce-based CSP.
    pub production: bool,
    /// Keeps the deprecated `resync` route alias alive.
    pub allow_resync_alias: bool,
}

impl EnvFlags {
    pub fn from_env() -> Self {
        Self {
            admin_token: env::var("ADMIN_TOKEN")
                .ok()
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            production: env::var("APP_ENV").is_ok_and(|v| v == "production"),
            allow_resync_alias: env::var("ALLOW_RESYNC_ALIAS")
                .is_ok_and(|v| matches!(v.as_str(), "1" | "true" | "yes")),
        }
    }
}

fn default_name_cap() -> usize {
    120
}

fn default_log_directory() -> String {
    "log".to_string()
}

fn default_log_filename() -> String {
    "modwarden.log".to_string()
}

fn default_log_keep() -> usize {
    2
}

fn default_log_size_mib() -> u64 {
    1
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_static_dir() -> String {
    "web/dist".to_string()
}

fn default_global_limit() -> usize {
    16
}

fn default_per_instance_limit() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

fn default_shutdown_grace() -> u64 {
    30
}

pub fn get_configuration() -> Result<Settings> {
    let settings = config::Config::builder()
        .add_source(config::File::new(
            "configuration.yaml",
            config::FileFormat::Yaml,
        ))
        .build()?;
    let mut settings = settings.try_deserialize::<Settings>()?;
    settings.env = EnvFlags::from_env();
    Ok(settings)
}
