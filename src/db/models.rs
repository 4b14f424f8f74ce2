use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DriveError;

/// Singleton integration settings record. Secret fields arrive decrypted
/// from the store and are re-encrypted on save.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DriveSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Optional parent for newly provisioned project folders.
    pub root_folder_id: Option<String>,
    pub before_folder_name: Option<String>,
    pub after_folder_name: Option<String>,
    pub auto_upload_project_photos: bool,
    pub auto_create_project_folder: bool,
}

impl DriveSettings {
    pub fn before_name(&self) -> &str {
        self.before_folder_name.as_deref().unwrap_or("Before")
    }

    pub fn after_name(&self) -> &str {
        self.after_folder_name.as_deref().unwrap_or("After")
    }

    /// The fields without which no OAuth call can be attempted.
    pub fn require_client(&self) -> Result<(&str, &str, &str), DriveError> {
        let client_id = self
            .client_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DriveError::Configuration("client_id is not set".to_string()))?;
        let client_secret = self
            .client_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                DriveError::Configuration("client_secret is not set".to_string())
            })?;
        let redirect_uri = self
            .redirect_uri
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                DriveError::Configuration("redirect_uri is not set".to_string())
            })?;
        Ok((client_id, client_secret, redirect_uri))
    }
}

/// Classification of a photo, determining its target subfolder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Before,
    After,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Before => "Before",
            Stage::After => "After",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DriveError> {
        match s {
            "Before" => Ok(Stage::Before),
            "After" => Ok(Stage::After),
            other => Err(DriveError::IntegrationState(format!(
                "unknown photo stage: {other}"
            ))),
        }
    }
}

/// Persisted association between a project and its provisioned folder tree.
/// `project_id` is the natural key; `root_folder_id` never changes once set,
/// and the subfolder ids are filled in lazily, never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FolderMapping {
    pub project_id: String,
    pub root_folder_id: String,
    pub root_folder_url: String,
    pub before_folder_id: Option<String>,
    pub after_folder_id: Option<String>,
    pub last_checked_at: DateTime<Utc>,
}

impl FolderMapping {
    pub fn is_complete(&self) -> bool {
        self.before_folder_id.is_some() && self.after_folder_id.is_some()
    }

    pub fn stage_folder_id(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Before => self.before_folder_id.as_deref(),
            Stage::After => self.after_folder_id.as_deref(),
        }
    }

    pub fn view_url(root_folder_id: &str) -> String {
        format!("https://drive.google.com/drive/folders/{root_folder_id}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPhoto {
    pub project_id: String,
    pub stage: Stage,
    pub local_file_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhotoRecord {
    pub id: i64,
    pub project_id: String,
    pub stage: Stage,
    pub local_file_ref: Option<String>,
    pub remote_file_id: Option<String>,
    pub remote_file_url: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
}
