//! Idempotent per-project folder provisioning.
//!
//! Repeated invocations for the same project never duplicate the root folder
//! and converge missing subfolders without touching already-resolved ones.

use chrono::Utc;
use tracing::info;

use crate::db::{DriveSettings, FolderMapping, IntegrationStore};
use crate::error::DriveError;
use crate::google_drive::DriveClient;

pub struct FolderProvisioner<'a> {
    client: &'a mut DriveClient,
    store: &'a dyn IntegrationStore,
    settings: &'a DriveSettings,
}

impl<'a> FolderProvisioner<'a> {
    pub fn new(
        client: &'a mut DriveClient,
        store: &'a dyn IntegrationStore,
        settings: &'a DriveSettings,
    ) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }

    /// Guarantee one root folder per project with Before and After
    /// subfolders, reusing anything already provisioned. A complete mapping
    /// returns as-is with no network calls.
    pub async fn ensure_project_folders(
        &mut self,
        project_id: &str,
    ) -> Result<FolderMapping, DriveError> {
        if let Some(mapping) = self.store.mapping_by_project(project_id).await? {
            if mapping.is_complete() {
                return Ok(mapping);
            }
            // Root exists but one or both subfolders are missing (e.g. a
            // manually created mapping).
            return self.ensure_stage_folders(mapping).await;
        }

        let display_name = self.store.project_display_name(project_id).await?;
        let folder_name = display_name.as_deref().unwrap_or(project_id);

        let parent_id = self.settings.root_folder_id.as_deref();
        let root_id = self.client.get_or_create_folder(folder_name, parent_id).await?;

        let before_id = self
            .client
            .get_or_create_folder(self.settings.before_name(), Some(&root_id))
            .await?;
        let after_id = self
            .client
            .get_or_create_folder(self.settings.after_name(), Some(&root_id))
            .await?;

        let mapping = FolderMapping {
            project_id: project_id.to_string(),
            root_folder_url: FolderMapping::view_url(&root_id),
            root_folder_id: root_id,
            before_folder_id: Some(before_id),
            after_folder_id: Some(after_id),
            last_checked_at: Utc::now(),
        };
        self.store.upsert_mapping(&mapping).await?;
        info!(project_id, root = %mapping.root_folder_id, "provisioned project folder tree");
        Ok(mapping)
    }

    /// Backfill missing Before/After subfolders on an existing mapping.
    /// Non-empty ids are never overwritten.
    pub async fn ensure_stage_folders(
        &mut self,
        mut mapping: FolderMapping,
    ) -> Result<FolderMapping, DriveError> {
        let mut updated = false;

        if mapping.before_folder_id.is_none() {
            let id = self
                .client
                .get_or_create_folder(self.settings.before_name(), Some(&mapping.root_folder_id))
                .await?;
            mapping.before_folder_id = Some(id);
            updated = true;
        }
        if mapping.after_folder_id.is_none() {
            let id = self
                .client
                .get_or_create_folder(self.settings.after_name(), Some(&mapping.root_folder_id))
                .await?;
            mapping.after_folder_id = Some(id);
            updated = true;
        }

        if updated {
            mapping.last_checked_at = Utc::now();
            self.store.upsert_mapping(&mapping).await?;
        }
        Ok(mapping)
    }
}
