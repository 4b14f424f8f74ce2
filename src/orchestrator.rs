//! Upload orchestration, driven by an explicit "photo record persisted"
//! event rather than storage lifecycle hooks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::db::{DriveSettings, FolderMapping, IntegrationStore, PhotoRecord};
use crate::error::DriveError;
use crate::google_drive::oauth::{OAuthManager, OAuthTokens};
use crate::google_drive::{DriveClient, DriveEndpoints, UploadedFile};
use crate::provision::FolderProvisioner;

/// Emitted by the record surface whenever a photo record is created or
/// updated.
#[derive(Debug, Clone)]
pub struct PhotoPersisted {
    pub photo: PhotoRecord,
}

/// Build a Drive client from stored settings. Fails fast on missing client
/// configuration, before any network call.
pub fn build_drive_client(
    settings: &DriveSettings,
    endpoints: DriveEndpoints,
) -> Result<DriveClient, DriveError> {
    let (client_id, client_secret, redirect_uri) = settings.require_client()?;
    let oauth = OAuthManager::new(
        client_id.to_string(),
        client_secret.to_string(),
        redirect_uri.to_string(),
        OAuthTokens {
            access_token: settings.access_token.clone(),
            refresh_token: settings.refresh_token.clone(),
            expires_at: settings.token_expires_at,
        },
        endpoints.clone(),
    );
    Ok(DriveClient::new(oauth, endpoints))
}

/// Write a refreshed token pair back to the store. No-op when the manager
/// did not refresh.
pub async fn persist_token_refresh(
    store: &dyn IntegrationStore,
    oauth: &OAuthManager,
) -> Result<(), DriveError> {
    if let Some((access_token, expires_at)) = oauth.token_update() {
        store.save_token_refresh(access_token, expires_at).await?;
        debug!("persisted refreshed access token");
    }
    Ok(())
}

pub struct UploadOrchestrator {
    store: Arc<dyn IntegrationStore>,
    endpoints: DriveEndpoints,
    files_dir: PathBuf,
}

impl UploadOrchestrator {
    pub fn new(
        store: Arc<dyn IntegrationStore>,
        endpoints: DriveEndpoints,
        files_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            endpoints,
            files_dir,
        }
    }

    /// One upload attempt per record transition into "has local file, no
    /// remote id yet". Deliberate no-ops: auto-upload disabled, remote id
    /// already set, no file attached. Everything else surfaces.
    pub async fn on_photo_persisted(
        &self,
        event: &PhotoPersisted,
    ) -> Result<Option<UploadedFile>, DriveError> {
        let photo = &event.photo;
        let settings = self.store.load_settings().await?;

        if !settings.auto_upload_project_photos {
            return Ok(None);
        }
        if photo.remote_file_id.is_some() {
            return Ok(None);
        }
        let Some(local_file_ref) = photo.local_file_ref.as_deref() else {
            return Ok(None);
        };

        let mut client = build_drive_client(&settings, self.endpoints.clone())?;
        if settings.access_token.is_some() {
            client.oauth_mut().ensure_valid_token().await?;
            persist_token_refresh(self.store.as_ref(), client.oauth()).await?;
        }

        let mapping = self
            .resolve_mapping(&mut client, &settings, &photo.project_id)
            .await?;

        let target_folder_id = mapping
            .stage_folder_id(photo.stage)
            .ok_or_else(|| {
                DriveError::IntegrationState(
                    "target Drive subfolder not found (Before/After)".to_string(),
                )
            })?
            .to_string();

        let path = self.resolve_file(local_file_ref);
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(local_file_ref)
            .to_string();
        let content_bytes = tokio::fs::read(&path).await?;
        let mime_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .to_string();

        let uploaded = client
            .upload_file(
                &filename,
                &content_bytes,
                Some(&target_folder_id),
                Some(&mime_type),
            )
            .await?;

        self.store
            .mark_photo_uploaded(
                photo.id,
                &uploaded.remote_id,
                uploaded.remote_view_link.as_deref(),
                Utc::now(),
            )
            .await?;
        persist_token_refresh(self.store.as_ref(), client.oauth()).await?;

        info!(
            photo_id = photo.id,
            project_id = %photo.project_id,
            stage = photo.stage.as_str(),
            remote_id = %uploaded.remote_id,
            "photo uploaded"
        );
        Ok(Some(uploaded))
    }

    async fn resolve_mapping(
        &self,
        client: &mut DriveClient,
        settings: &DriveSettings,
        project_id: &str,
    ) -> Result<FolderMapping, DriveError> {
        let mut provisioner = FolderProvisioner::new(client, self.store.as_ref(), settings);
        if settings.auto_create_project_folder {
            return provisioner.ensure_project_folders(project_id).await;
        }

        let mapping = self
            .store
            .mapping_by_project(project_id)
            .await?
            .ok_or_else(|| {
                DriveError::IntegrationState(
                    "Drive folder mapping not found. Enable auto-create project folder \
                     or create the mapping record."
                        .to_string(),
                )
            })?;
        // Both stage subfolders must still exist so either stage can land.
        provisioner.ensure_stage_folders(mapping).await
    }

    fn resolve_file(&self, local_file_ref: &str) -> PathBuf {
        let raw = Path::new(local_file_ref);
        if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.files_dir.join(raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::tests::temp_storage;
    use crate::db::{NewPhoto, Stage};
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connected_settings() -> DriveSettings {
        DriveSettings {
            client_id: Some("cid".into()),
            client_secret: Some("csecret".into()),
            redirect_uri: Some("https://example.com/drive/callback".into()),
            access_token: Some("tok".into()),
            refresh_token: Some("ref".into()),
            token_expires_at: Some(Utc::now() + ChronoDuration::hours(1)),
            auto_upload_project_photos: true,
            auto_create_project_folder: true,
            ..Default::default()
        }
    }

    async fn photo_fixture(
        storage: &crate::db::SqliteStorage,
        stage: Stage,
        local_file_ref: Option<&str>,
    ) -> PhotoRecord {
        storage
            .insert_photo(&NewPhoto {
                project_id: "PRJ-1".into(),
                stage,
                local_file_ref: local_file_ref.map(|s| s.to_string()),
            })
            .await
            .unwrap()
    }

    fn orchestrator_for(
        storage: crate::db::SqliteStorage,
        server: &MockServer,
        files_dir: PathBuf,
    ) -> UploadOrchestrator {
        UploadOrchestrator::new(
            Arc::new(storage),
            DriveEndpoints::with_base(&server.uri()),
            files_dir,
        )
    }

    #[tokio::test]
    async fn auto_upload_disabled_is_a_silent_no_op() {
        let server = MockServer::start().await;
        // No mocks: any network call fails the test.
        let (storage, _dir) = temp_storage().await;
        storage
            .save_settings(&DriveSettings {
                auto_upload_project_photos: false,
                ..connected_settings()
            })
            .await
            .unwrap();
        let photo = photo_fixture(&storage, Stage::Before, Some("a.png")).await;

        let orchestrator = orchestrator_for(storage, &server, PathBuf::from("/nonexistent"));
        let outcome = orchestrator
            .on_photo_persisted(&PhotoPersisted { photo })
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn already_uploaded_photo_is_not_reuploaded() {
        let server = MockServer::start().await;
        let (storage, _dir) = temp_storage().await;
        storage.save_settings(&connected_settings()).await.unwrap();
        let mut photo = photo_fixture(&storage, Stage::Before, Some("a.png")).await;
        photo.remote_file_id = Some("ALREADY".into());

        let orchestrator = orchestrator_for(storage, &server, PathBuf::from("/nonexistent"));
        let outcome = orchestrator
            .on_photo_persisted(&PhotoPersisted { photo })
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn photo_without_local_file_is_skipped() {
        let server = MockServer::start().await;
        let (storage, _dir) = temp_storage().await;
        storage.save_settings(&connected_settings()).await.unwrap();
        let photo = photo_fixture(&storage, Stage::After, None).await;

        let orchestrator = orchestrator_for(storage, &server, PathBuf::from("/nonexistent"));
        let outcome = orchestrator
            .on_photo_persisted(&PhotoPersisted { photo })
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_mapping_with_auto_create_disabled_fails_loudly() {
        let server = MockServer::start().await;
        let (storage, _dir) = temp_storage().await;
        let files = tempfile::TempDir::new().unwrap();
        std::fs::write(files.path().join("a.png"), b"png").unwrap();
        storage
            .save_settings(&DriveSettings {
                auto_create_project_folder: false,
                ..connected_settings()
            })
            .await
            .unwrap();
        let photo = photo_fixture(&storage, Stage::Before, Some("a.png")).await;

        let orchestrator = orchestrator_for(storage, &server, files.path().to_path_buf());
        let err = orchestrator
            .on_photo_persisted(&PhotoPersisted { photo })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DriveError::IntegrationState(msg) if msg.contains("mapping not found")
        ));
    }

    #[tokio::test]
    async fn end_to_end_fresh_project_before_photo() {
        let server = MockServer::start().await;
        // Folder searches all miss.
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": []})))
            .expect(3)
            .mount(&server)
            .await;
        for (name, id) in [("PRJ-1", "ROOT1"), ("Before", "B1"), ("After", "A1")] {
            Mock::given(method("POST"))
                .and(path("/drive/v3/files"))
                .and(body_string_contains(format!("\"name\":\"{name}\"")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": id})))
                .expect(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "FILE1",
                "webViewLink": "https://drive.google.com/file/d/FILE1/view"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (storage, _dir) = temp_storage().await;
        storage.save_settings(&connected_settings()).await.unwrap();
        let files = tempfile::TempDir::new().unwrap();
        std::fs::write(files.path().join("site.png"), b"\x89PNG fake").unwrap();
        let photo = photo_fixture(&storage, Stage::Before, Some("site.png")).await;
        let photo_id = photo.id;

        let orchestrator = orchestrator_for(
            storage.clone(),
            &server,
            files.path().to_path_buf(),
        );
        let uploaded = orchestrator
            .on_photo_persisted(&PhotoPersisted { photo })
            .await
            .unwrap()
            .expect("upload should happen");
        assert_eq!(uploaded.remote_id, "FILE1");

        // Mapping converged and the photo record carries the remote fields.
        let mapping = storage.mapping_by_project("PRJ-1").await.unwrap().unwrap();
        assert_eq!(mapping.root_folder_id, "ROOT1");
        assert_eq!(mapping.before_folder_id.as_deref(), Some("B1"));
        assert_eq!(mapping.after_folder_id.as_deref(), Some("A1"));

        let record = storage.photo_by_id(photo_id).await.unwrap().unwrap();
        assert_eq!(record.remote_file_id.as_deref(), Some("FILE1"));
        assert!(record.remote_file_url.as_deref().unwrap().contains("FILE1"));
        assert!(record.uploaded_at.is_some());

        // The upload landed in the Before subfolder.
        let upload_req = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.url.path().starts_with("/upload/"))
            .unwrap();
        let body = String::from_utf8_lossy(&upload_req.body).into_owned();
        assert!(body.contains("\"parents\":[\"B1\"]"));
        assert!(body.contains("\"name\":\"site.png\""));
        assert!(body.contains("Content-Type: image/png"));
    }

    #[tokio::test]
    async fn after_photo_targets_after_subfolder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(body_string_contains("\"parents\":[\"A1\"]"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "FILE2"})))
            .expect(1)
            .mount(&server)
            .await;

        let (storage, _dir) = temp_storage().await;
        storage.save_settings(&connected_settings()).await.unwrap();
        storage
            .upsert_mapping(&FolderMapping {
                project_id: "PRJ-1".into(),
                root_folder_id: "ROOT1".into(),
                root_folder_url: FolderMapping::view_url("ROOT1"),
                before_folder_id: Some("B1".into()),
                after_folder_id: Some("A1".into()),
                last_checked_at: Utc::now(),
            })
            .await
            .unwrap();
        let files = tempfile::TempDir::new().unwrap();
        std::fs::write(files.path().join("done.jpg"), b"jpg").unwrap();
        let photo = photo_fixture(&storage, Stage::After, Some("done.jpg")).await;

        let orchestrator = orchestrator_for(storage, &server, files.path().to_path_buf());
        let uploaded = orchestrator
            .on_photo_persisted(&PhotoPersisted { photo })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(uploaded.remote_id, "FILE2");
        assert_eq!(uploaded.remote_view_link, None);
    }
}
