use std::sync::Arc;

use axum_extra::extract::cookie::Key;
use base64::Engine;
use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use drivelink::config::Config;
use drivelink::db::SqliteStorage;
use drivelink::google_drive::DriveEndpoints;
use drivelink::router::{AppState, drive_router};
use drivelink::secrets::SecretBox;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::from_env()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        bind_addr = %cfg.bind_addr,
        files_dir = %cfg.files_dir.display(),
        loglevel = %cfg.loglevel,
    );

    let secrets = SecretBox::load_or_create(&cfg.secret_key_path)?;
    let storage = SqliteStorage::connect(&cfg.database_url, secrets).await?;

    let cookie_key = match cfg.cookie_secret.as_deref() {
        Some(encoded) => {
            let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
            if bytes.len() < 64 {
                return Err("DRIVELINK_COOKIE_SECRET must decode to at least 64 bytes".into());
            }
            Key::from(&bytes)
        }
        None => {
            warn!("COOKIE_SECRET unset; in-flight authorizations will not survive a restart");
            Key::generate()
        }
    };

    let state = AppState::new(
        Arc::new(storage),
        DriveEndpoints::default(),
        Arc::from(cfg.service_key.as_str()),
        Arc::from(cfg.settings_page.as_str()),
        cfg.files_dir.clone(),
        cookie_key,
    );
    let app = drive_router(state);

    let listener = TcpListener::bind(&cfg.bind_addr).await?;
    info!("HTTP server listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
