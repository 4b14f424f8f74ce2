use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

use async_trait::async_trait;

use crate::db::models::{DriveSettings, FolderMapping, NewPhoto, PhotoRecord, Stage};
use crate::db::schema::SQLITE_INIT;
use crate::db::IntegrationStore;
use crate::error::DriveError;
use crate::secrets::SecretBox;

pub type SqlitePool = Pool<Sqlite>;

/// Bundled SQLite implementation of the record store. Secret columns are
/// sealed through the supplied `SecretBox` before binding.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    secrets: SecretBox,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool, secrets: SecretBox) -> Self {
        Self { pool, secrets }
    }

    pub async fn connect(database_url: &str, secrets: SecretBox) -> Result<Self, DriveError> {
        let connect_opts =
            SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
        let storage = Self::new(pool, secrets);
        storage.init_schema().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), DriveError> {
        // execute multiple statements safely (SQLite supports multi-commands but sqlx::query doesn't)
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn seal(&self, value: Option<&str>) -> Result<Option<String>, DriveError> {
        value
            .filter(|s| !s.is_empty())
            .map(|s| self.secrets.encrypt(s))
            .transpose()
            .map_err(Into::into)
    }

    fn open(&self, value: Option<String>) -> Result<Option<String>, DriveError> {
        value
            .map(|s| self.secrets.decrypt(&s))
            .transpose()
            .map_err(Into::into)
    }

    fn settings_from_row(&self, row: SqliteRow) -> Result<DriveSettings, DriveError> {
        let token_expires_at: Option<String> = row.try_get("token_expires_at")?;
        Ok(DriveSettings {
            client_id: row.try_get("client_id")?,
            client_secret: self.open(row.try_get("client_secret")?)?,
            redirect_uri: row.try_get("redirect_uri")?,
            access_token: self.open(row.try_get("access_token")?)?,
            refresh_token: self.open(row.try_get("refresh_token")?)?,
            token_expires_at: token_expires_at.map(|s| parse_utc(&s)).transpose()?,
            root_folder_id: row.try_get("root_folder_id")?,
            before_folder_name: row.try_get("before_folder_name")?,
            after_folder_name: row.try_get("after_folder_name")?,
            auto_upload_project_photos: row.try_get::<i64, _>("auto_upload_project_photos")? != 0,
            auto_create_project_folder: row.try_get::<i64, _>("auto_create_project_folder")? != 0,
        })
    }

    fn mapping_from_row(row: SqliteRow) -> Result<FolderMapping, DriveError> {
        let last_checked_at: String = row.try_get("last_checked_at")?;
        Ok(FolderMapping {
            project_id: row.try_get("project_id")?,
            root_folder_id: row.try_get("root_folder_id")?,
            root_folder_url: row.try_get("root_folder_url")?,
            before_folder_id: row.try_get("before_folder_id")?,
            after_folder_id: row.try_get("after_folder_id")?,
            last_checked_at: parse_utc(&last_checked_at)?,
        })
    }

    fn photo_from_row(row: SqliteRow) -> Result<PhotoRecord, DriveError> {
        let stage: String = row.try_get("stage")?;
        let uploaded_at: Option<String> = row.try_get("uploaded_at")?;
        Ok(PhotoRecord {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            stage: Stage::parse(&stage)?,
            local_file_ref: row.try_get("local_file_ref")?,
            remote_file_id: row.try_get("remote_file_id")?,
            remote_file_url: row.try_get("remote_file_url")?,
            uploaded_at: uploaded_at.map(|s| parse_utc(&s)).transpose()?,
        })
    }
}

fn parse_utc(s: &str) -> Result<DateTime<Utc>, DriveError> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
        .with_timezone(&Utc))
}

#[async_trait]
impl IntegrationStore for SqliteStorage {
    async fn load_settings(&self) -> Result<DriveSettings, DriveError> {
        let row = sqlx::query("SELECT * FROM drive_settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => self.settings_from_row(row),
            None => Ok(DriveSettings::default()),
        }
    }

    async fn save_settings(&self, settings: &DriveSettings) -> Result<(), DriveError> {
        sqlx::query(
            r#"
            INSERT INTO drive_settings (
                id, client_id, client_secret, redirect_uri,
                access_token, refresh_token, token_expires_at,
                root_folder_id, before_folder_name, after_folder_name,
                auto_upload_project_photos, auto_create_project_folder
            ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                client_id=excluded.client_id,
                client_secret=excluded.client_secret,
                redirect_uri=excluded.redirect_uri,
                access_token=excluded.access_token,
                refresh_token=excluded.refresh_token,
                token_expires_at=excluded.token_expires_at,
                root_folder_id=excluded.root_folder_id,
                before_folder_name=excluded.before_folder_name,
                after_folder_name=excluded.after_folder_name,
                auto_upload_project_photos=excluded.auto_upload_project_photos,
                auto_create_project_folder=excluded.auto_create_project_folder
            "#,
        )
        .bind(&settings.client_id)
        .bind(self.seal(settings.client_secret.as_deref())?)
        .bind(&settings.redirect_uri)
        .bind(self.seal(settings.access_token.as_deref())?)
        .bind(self.seal(settings.refresh_token.as_deref())?)
        .bind(settings.token_expires_at.map(|t| t.to_rfc3339()))
        .bind(&settings.root_folder_id)
        .bind(&settings.before_folder_name)
        .bind(&settings.after_folder_name)
        .bind(if settings.auto_upload_project_photos { 1 } else { 0 })
        .bind(if settings.auto_create_project_folder { 1 } else { 0 })
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_token_refresh(
        &self,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DriveError> {
        sqlx::query(
            "UPDATE drive_settings SET access_token = ?, token_expires_at = ? WHERE id = 1",
        )
        .bind(self.seal(Some(access_token))?)
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn project_display_name(
        &self,
        project_id: &str,
    ) -> Result<Option<String>, DriveError> {
        let row = sqlx::query("SELECT display_name FROM projects WHERE project_id = ?")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|r| r.try_get::<Option<String>, _>("display_name").ok().flatten()))
    }

    async fn upsert_project(
        &self,
        project_id: &str,
        display_name: Option<&str>,
    ) -> Result<(), DriveError> {
        sqlx::query(
            r#"
            INSERT INTO projects (project_id, display_name) VALUES (?, ?)
            ON CONFLICT(project_id) DO UPDATE SET display_name=excluded.display_name
            "#,
        )
        .bind(project_id)
        .bind(display_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mapping_by_project(
        &self,
        project_id: &str,
    ) -> Result<Option<FolderMapping>, DriveError> {
        let row = sqlx::query("SELECT * FROM folder_mappings WHERE project_id = ?")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::mapping_from_row).transpose()
    }

    async fn upsert_mapping(&self, mapping: &FolderMapping) -> Result<(), DriveError> {
        sqlx::query(
            r#"
            INSERT INTO folder_mappings (
                project_id, root_folder_id, root_folder_url,
                before_folder_id, after_folder_id, last_checked_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(project_id) DO UPDATE SET
                root_folder_id=excluded.root_folder_id,
                root_folder_url=excluded.root_folder_url,
                before_folder_id=excluded.before_folder_id,
                after_folder_id=excluded.after_folder_id,
                last_checked_at=excluded.last_checked_at
            "#,
        )
        .bind(&mapping.project_id)
        .bind(&mapping.root_folder_id)
        .bind(&mapping.root_folder_url)
        .bind(&mapping.before_folder_id)
        .bind(&mapping.after_folder_id)
        .bind(mapping.last_checked_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_photo(&self, photo: &NewPhoto) -> Result<PhotoRecord, DriveError> {
        let result = sqlx::query(
            "INSERT INTO project_photos (project_id, stage, local_file_ref) VALUES (?, ?, ?)",
        )
        .bind(&photo.project_id)
        .bind(photo.stage.as_str())
        .bind(&photo.local_file_ref)
        .execute(&self.pool)
        .await?;

        Ok(PhotoRecord {
            id: result.last_insert_rowid(),
            project_id: photo.project_id.clone(),
            stage: photo.stage,
            local_file_ref: photo.local_file_ref.clone(),
            remote_file_id: None,
            remote_file_url: None,
            uploaded_at: None,
        })
    }

    async fn photo_by_id(&self, id: i64) -> Result<Option<PhotoRecord>, DriveError> {
        let row = sqlx::query("SELECT * FROM project_photos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::photo_from_row).transpose()
    }

    async fn set_photo_file(&self, id: i64, local_file_ref: &str) -> Result<(), DriveError> {
        sqlx::query("UPDATE project_photos SET local_file_ref = ? WHERE id = ?")
            .bind(local_file_ref)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_photo_uploaded(
        &self,
        id: i64,
        remote_file_id: &str,
        remote_file_url: Option<&str>,
        uploaded_at: DateTime<Utc>,
    ) -> Result<(), DriveError> {
        sqlx::query(
            r#"
            UPDATE project_photos
            SET remote_file_id = ?, remote_file_url = ?, uploaded_at = ?
            WHERE id = ?
            "#,
        )
        .bind(remote_file_id)
        .bind(remote_file_url)
        .bind(uploaded_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
