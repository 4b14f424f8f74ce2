//! Runtime configuration, read once at startup from `DRIVELINK_*` environment
//! variables and passed explicitly into construction. No ambient globals.

use std::path::PathBuf;

use figment::{Figment, providers::Env};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// SQLite database URL for the integration record store.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Bind address for the HTTP server.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Shared key guarding the action endpoints.
    pub service_key: String,

    /// Directory containing locally attached files referenced by photo
    /// records.
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,

    /// Path of the field-encryption key file, created on first boot.
    #[serde(default = "default_secret_key_path")]
    pub secret_key_path: PathBuf,

    /// Where the OAuth callback sends the user afterwards.
    #[serde(default = "default_settings_page")]
    pub settings_page: String,

    /// Optional base64 key (>= 64 bytes decoded) for the private cookie jar.
    /// A random per-boot key is generated when unset.
    #[serde(default)]
    pub cookie_secret: Option<String>,

    #[serde(default = "default_loglevel")]
    pub loglevel: String,
}

fn default_database_url() -> String {
    "sqlite:drivelink.sqlite".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_files_dir() -> PathBuf {
    PathBuf::from("files")
}

fn default_secret_key_path() -> PathBuf {
    PathBuf::from("drivelink.key")
}

fn default_settings_page() -> String {
    "/app/drive-settings".to_string()
}

fn default_loglevel() -> String {
    "info".to_string()
}

impl Config {
    pub fn from_env() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Env::prefixed("DRIVELINK_"))
            .extract()
    }
}
