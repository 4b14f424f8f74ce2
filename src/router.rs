use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{FromRef, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::Router;
use axum_extra::extract::cookie::Key;

use crate::db::IntegrationStore;
use crate::google_drive::DriveEndpoints;
use crate::middleware::auth::ensure_authorized;
use crate::orchestrator::UploadOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IntegrationStore>,
    pub orchestrator: Arc<UploadOrchestrator>,
    pub endpoints: DriveEndpoints,
    pub service_key: Arc<str>,
    pub settings_page: Arc<str>,
    cookie_key: Key,
}

impl AppState {
    pub fn new(
        store: Arc<dyn IntegrationStore>,
        endpoints: DriveEndpoints,
        service_key: Arc<str>,
        settings_page: Arc<str>,
        files_dir: PathBuf,
        cookie_key: Key,
    ) -> Self {
        let orchestrator = Arc::new(UploadOrchestrator::new(
            store.clone(),
            endpoints.clone(),
            files_dir,
        ));
        Self {
            store,
            orchestrator,
            endpoints,
            service_key,
            settings_page,
            cookie_key,
        }
    }
}

// PrivateCookieJar pulls its key out of the state.
impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Key {
        state.cookie_key.clone()
    }
}

async fn service_key_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let query = request.uri().query();
    match ensure_authorized(request.headers(), query, &state.service_key) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}

pub fn drive_router(state: AppState) -> Router {
    let guarded = Router::new()
        .route("/drive/auth-url", get(crate::handlers::drive::get_auth_url))
        .route(
            "/drive/test-connection",
            post(crate::handlers::drive::test_connection),
        )
        .route(
            "/drive/settings",
            put(crate::handlers::drive::update_settings),
        )
        .route("/projects", post(crate::handlers::photos::create_project))
        .route("/photos", post(crate::handlers::photos::create_photo))
        .route(
            "/photos/{id}",
            axum::routing::patch(crate::handlers::photos::update_photo),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            service_key_guard,
        ));

    Router::new()
        // The callback must stay reachable without prior authentication.
        .route("/drive/callback", get(crate::handlers::drive::oauth_callback))
        .route("/healthz", get(|| async { StatusCode::OK }))
        .merge(guarded)
        .with_state(state)
}
