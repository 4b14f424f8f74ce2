//! SQL DDL for initializing the integration record store.
//! SQLite-first design; can be adapted for other RDBMS.

/// Schema notes:
/// - `drive_settings` is a singleton row (id fixed to 1); secret columns hold
///   AEAD-sealed values, never plaintext
/// - `folder_mappings` is keyed by `project_id` directly (natural key, one
///   mapping per project)
/// - timestamps are RFC3339 TEXT, always UTC
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS drive_settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    client_id TEXT NULL,
    client_secret TEXT NULL,
    redirect_uri TEXT NULL,
    access_token TEXT NULL,
    refresh_token TEXT NULL,
    token_expires_at TEXT NULL,
    root_folder_id TEXT NULL,
    before_folder_name TEXT NULL,
    after_folder_name TEXT NULL,
    auto_upload_project_photos INTEGER NOT NULL DEFAULT 1,
    auto_create_project_folder INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS projects (
    project_id TEXT PRIMARY KEY,
    display_name TEXT NULL
);

CREATE TABLE IF NOT EXISTS folder_mappings (
    project_id TEXT PRIMARY KEY,
    root_folder_id TEXT NOT NULL,
    root_folder_url TEXT NOT NULL,
    before_folder_id TEXT NULL,
    after_folder_id TEXT NULL,
    last_checked_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS project_photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    local_file_ref TEXT NULL,
    remote_file_id TEXT NULL,
    remote_file_url TEXT NULL,
    uploaded_at TEXT NULL
);

CREATE INDEX IF NOT EXISTS idx_project_photos_project_id ON project_photos(project_id);
"#;
