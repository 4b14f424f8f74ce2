//! Authenticated Drive v3 calls: folder search/creation and multipart upload.

use serde_json::{Value, json};
use std::time::Duration;

use super::DriveEndpoints;
use super::oauth::OAuthManager;
use crate::error::DriveError;

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of a file upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub remote_id: String,
    pub remote_view_link: Option<String>,
}

/// Drive API client. Every authenticated call goes through
/// `OAuthManager::bearer`, which refreshes the token first when needed.
pub struct DriveClient {
    http: reqwest::Client,
    oauth: OAuthManager,
    endpoints: DriveEndpoints,
}

impl DriveClient {
    pub fn new(oauth: OAuthManager, endpoints: DriveEndpoints) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("FATAL: initialize Drive HTTP client failed");
        Self {
            http,
            oauth,
            endpoints,
        }
    }

    pub fn oauth(&self) -> &OAuthManager {
        &self.oauth
    }

    pub fn oauth_mut(&mut self) -> &mut OAuthManager {
        &mut self.oauth
    }

    /// Lightweight read confirming auth works: list at most one file.
    pub async fn list_one(&mut self) -> Result<Value, DriveError> {
        let token = self.oauth.bearer().await?;
        let resp = self
            .http
            .get(&self.endpoints.files_url)
            .bearer_auth(token)
            .query(&[("pageSize", "1"), ("fields", "files(id,name)")])
            .send()
            .await?;
        let resp = error_for_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// Find a non-trashed folder with an exact name match under `parent_id`
    /// (or under the root container). First match wins; the provider allows
    /// duplicate names and no reconciliation is attempted.
    pub async fn find_folder(
        &mut self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<String>, DriveError> {
        let escaped_name = name.replace('"', "\\\"");
        let mut q = vec![
            format!("mimeType=\"{FOLDER_MIME}\""),
            format!("name=\"{escaped_name}\""),
            "trashed=false".to_string(),
        ];
        match parent_id {
            Some(parent) => q.push(format!("\"{parent}\" in parents")),
            None => q.push("'root' in parents".to_string()),
        }

        let token = self.oauth.bearer().await?;
        let resp = self
            .http
            .get(&self.endpoints.files_url)
            .bearer_auth(token)
            .query(&[
                ("q", q.join(" and ").as_str()),
                ("fields", "files(id,name)"),
                ("pageSize", "1"),
            ])
            .send()
            .await?;
        let resp = error_for_status(resp).await?;

        let body: Value = resp.json().await?;
        let id = body["files"]
            .as_array()
            .and_then(|files| files.first())
            .and_then(|f| f["id"].as_str())
            .map(|s| s.to_string());
        Ok(id)
    }

    /// Create a folder under `parent_id`, defaulting to the root container.
    pub async fn create_folder(
        &mut self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, DriveError> {
        let body = json!({
            "name": name,
            "mimeType": FOLDER_MIME,
            "parents": [parent_id.unwrap_or("root")],
        });

        let token = self.oauth.bearer().await?;
        let resp = self
            .http
            .post(&self.endpoints.files_url)
            .bearer_auth(token)
            .query(&[("fields", "id")])
            .json(&body)
            .send()
            .await?;
        let resp = error_for_status(resp).await?;

        let created: Value = resp.json().await?;
        created["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| DriveError::RemoteApi {
                status: 200,
                body: "folder create response missing id".to_string(),
            })
    }

    /// Find-then-create. Not atomic: two concurrent calls for the same
    /// missing folder can both create it. The provider offers no upsert, so
    /// duplicate folders are a rare but non-corrupting outcome callers must
    /// tolerate.
    pub async fn get_or_create_folder(
        &mut self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, DriveError> {
        if let Some(existing) = self.find_folder(name, parent_id).await? {
            return Ok(existing);
        }
        self.create_folder(name, parent_id).await
    }

    /// Multipart upload: a JSON metadata part naming the file and parent,
    /// then the raw content part, under a random boundary.
    pub async fn upload_file(
        &mut self,
        filename: &str,
        content_bytes: &[u8],
        parent_id: Option<&str>,
        mime_type: Option<&str>,
    ) -> Result<UploadedFile, DriveError> {
        let guessed;
        let mime_type = match mime_type {
            Some(m) => m,
            None => {
                guessed = mime_guess::from_path(filename)
                    .first_or_octet_stream()
                    .to_string();
                guessed.as_str()
            }
        };

        let meta = json!({
            "name": filename,
            "parents": [parent_id.unwrap_or("root")],
        });
        let boundary = format!("{:032x}", rand::random::<u128>());
        let body = build_multipart_body(&boundary, &serde_json::to_vec(&meta)?, mime_type, content_bytes);

        let token = self.oauth.bearer().await?;
        let resp = self
            .http
            .post(&self.endpoints.upload_url)
            .bearer_auth(token)
            .query(&[("uploadType", "multipart"), ("fields", "id,webViewLink")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary=\"{boundary}\""),
            )
            .timeout(UPLOAD_TIMEOUT)
            .body(body)
            .send()
            .await?;
        let resp = error_for_status(resp).await?;

        let uploaded: Value = resp.json().await?;
        let remote_id = uploaded["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| DriveError::RemoteApi {
                status: 200,
                body: "upload response missing id".to_string(),
            })?;
        Ok(UploadedFile {
            remote_id,
            remote_view_link: uploaded["webViewLink"].as_str().map(|s| s.to_string()),
        })
    }
}

/// Two parts in order: JSON metadata, then the content, with a terminated
/// final boundary line.
fn build_multipart_body(
    boundary: &str,
    meta_json: &[u8],
    mime_type: &str,
    content_bytes: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(meta_json.len() + content_bytes.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(meta_json);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(content_bytes);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response, DriveError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(DriveError::RemoteApi { status, body })
}
