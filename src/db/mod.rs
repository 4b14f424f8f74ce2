//! Record store: models and schema for the integration's persistent state.
//!
//! Layout:
//! - `models.rs`: settings, folder mappings, photo and project records
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: the bundled `IntegrationStore` implementation
//!
//! Core components only ever see the `IntegrationStore` trait; nothing above
//! this module assumes a specific persistence engine.

pub mod models;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use models::{DriveSettings, FolderMapping, NewPhoto, PhotoRecord, Stage};
pub use schema::SQLITE_INIT;
pub use sqlite::SqliteStorage;

use crate::error::DriveError;

/// Typed get/set/save surface over the platform's record store. Writes are
/// visible immediately after the call returns (single-writer durability).
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    async fn load_settings(&self) -> Result<DriveSettings, DriveError>;
    async fn save_settings(&self, settings: &DriveSettings) -> Result<(), DriveError>;

    /// Persist a refreshed token pair. Committed before this returns so the
    /// next use reads the new token.
    async fn save_token_refresh(
        &self,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DriveError>;

    async fn project_display_name(
        &self,
        project_id: &str,
    ) -> Result<Option<String>, DriveError>;
    async fn upsert_project(
        &self,
        project_id: &str,
        display_name: Option<&str>,
    ) -> Result<(), DriveError>;

    async fn mapping_by_project(
        &self,
        project_id: &str,
    ) -> Result<Option<FolderMapping>, DriveError>;
    async fn upsert_mapping(&self, mapping: &FolderMapping) -> Result<(), DriveError>;

    async fn insert_photo(&self, photo: &NewPhoto) -> Result<PhotoRecord, DriveError>;
    async fn photo_by_id(&self, id: i64) -> Result<Option<PhotoRecord>, DriveError>;
    async fn set_photo_file(&self, id: i64, local_file_ref: &str) -> Result<(), DriveError>;
    async fn mark_photo_uploaded(
        &self,
        id: i64,
        remote_file_id: &str,
        remote_file_url: Option<&str>,
        uploaded_at: DateTime<Utc>,
    ) -> Result<(), DriveError>;
}
