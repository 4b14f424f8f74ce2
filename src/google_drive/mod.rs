//! Google Drive integration: OAuth2 token lifecycle and the Drive v3 client.
//!
//! Layout:
//! - `oauth.rs`: authorization URL, code exchange, refresh-before-expiry
//! - `client.rs`: authenticated folder lookup/creation and multipart upload

pub mod client;
pub mod oauth;

pub use client::{DriveClient, UploadedFile};
pub use oauth::{OAuthManager, OAuthTokens, TokenResponse};

/// Drive scope requested during authorization. Full drive keeps folder
/// provisioning and upload simple; can be narrowed later.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Provider endpoints, overridable so tests can point at a local mock.
#[derive(Debug, Clone)]
pub struct DriveEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub files_url: String,
    pub upload_url: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            files_url: "https://www.googleapis.com/drive/v3/files".to_string(),
            upload_url: "https://www.googleapis.com/upload/drive/v3/files".to_string(),
        }
    }
}

impl DriveEndpoints {
    /// Endpoints rooted at a mock server base URL.
    pub fn with_base(base: &str) -> Self {
        Self {
            auth_url: format!("{base}/o/oauth2/v2/auth"),
            token_url: format!("{base}/token"),
            files_url: format!("{base}/drive/v3/files"),
            upload_url: format!("{base}/upload/drive/v3/files"),
        }
    }
}
