use axum::{
    Json,
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use oauth2::CsrfToken;
use serde::Deserialize;
use serde_json::json;
use time::Duration;
use tracing::{error, info};

use crate::actions;
use crate::db::{DriveSettings, IntegrationStore};
use crate::error::DriveError;
use crate::router::AppState;

const STATE_COOKIE: &str = "drive_oauth_state";

#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// GET /drive/auth-url -> provider authorization URL for the caller to open.
/// The random `state` is kept in a private cookie for callback verification.
pub async fn get_auth_url(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, DriveError> {
    let csrf = CsrfToken::new_random();
    let url =
        actions::get_auth_url(state.store.as_ref(), &state.endpoints, csrf.secret()).await?;
    let jar = jar.add(build_state_cookie(csrf.secret().to_string()));
    info!("issued Drive authorization URL");
    Ok((jar, Json(json!({ "auth_url": url }))))
}

/// GET /drive/callback -> exchanges the auth code for tokens and stores them.
/// Reachable without authentication; it is the first hop of the auth flow.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<AuthCallbackQuery>,
    jar: PrivateCookieJar,
) -> Response {
    let expected_state = jar.get(STATE_COOKIE).map(|c| c.value().to_owned());
    let jar = jar.remove(clear_state_cookie());

    if let Some(expected) = expected_state
        && query.state.as_deref() != Some(expected.as_str())
    {
        error!("OAuth callback state mismatch");
        return respond_error_page(jar, &state.settings_page, "State parameter mismatch.");
    }

    let Some(code) = query.code.as_deref() else {
        error!("OAuth callback missing authorization code");
        return respond_error_page(jar, &state.settings_page, "No authorization code received.");
    };

    match actions::complete_callback(state.store.as_ref(), &state.endpoints, code).await {
        Ok(()) => (jar, Redirect::to(&state.settings_page)).into_response(),
        Err(err) => {
            error!(error = %err, "OAuth callback failed");
            let message = match err {
                DriveError::Configuration(_) => {
                    "Client ID/Secret not configured in Drive settings.".to_string()
                }
                other => format!("Error: {other}"),
            };
            respond_error_page(jar, &state.settings_page, &message)
        }
    }
}

/// POST /drive/test-connection -> structured {ok, message, data?} outcome.
pub async fn test_connection(
    State(state): State<AppState>,
) -> Result<Json<actions::TestOutcome>, DriveError> {
    let outcome = actions::test_connection(state.store.as_ref(), &state.endpoints).await?;
    Ok(Json(outcome))
}

/// Partial update of the settings record. Absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsPatch {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub root_folder_id: Option<String>,
    pub before_folder_name: Option<String>,
    pub after_folder_name: Option<String>,
    pub auto_upload_project_photos: Option<bool>,
    pub auto_create_project_folder: Option<bool>,
}

/// PUT /drive/settings
pub async fn update_settings(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<serde_json::Value>, DriveError> {
    let mut settings = state.store.load_settings().await?;
    apply_patch(&mut settings, patch);
    state.store.save_settings(&settings).await?;
    Ok(Json(json!({ "ok": true })))
}

fn apply_patch(settings: &mut DriveSettings, patch: SettingsPatch) {
    if let Some(v) = patch.client_id {
        settings.client_id = Some(v);
    }
    if let Some(v) = patch.client_secret {
        settings.client_secret = Some(v);
    }
    if let Some(v) = patch.redirect_uri {
        settings.redirect_uri = Some(v);
    }
    if let Some(v) = patch.root_folder_id {
        settings.root_folder_id = Some(v);
    }
    if let Some(v) = patch.before_folder_name {
        settings.before_folder_name = Some(v);
    }
    if let Some(v) = patch.after_folder_name {
        settings.after_folder_name = Some(v);
    }
    if let Some(v) = patch.auto_upload_project_photos {
        settings.auto_upload_project_photos = v;
    }
    if let Some(v) = patch.auto_create_project_folder {
        settings.auto_create_project_folder = v;
    }
}

fn build_state_cookie(value: String) -> Cookie<'static> {
    Cookie::build(Cookie::new(STATE_COOKIE.to_string(), value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::minutes(15))
        .build()
}

fn clear_state_cookie() -> Cookie<'static> {
    Cookie::build(Cookie::new(STATE_COOKIE.to_string(), ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn respond_error_page(jar: PrivateCookieJar, settings_page: &str, message: &str) -> Response {
    let body = format!(
        "<html><body>\
         <h2>Google Drive Connection Error</h2>\
         <p>{message}</p>\
         <p><a href=\"{settings_page}\">Go to Drive Settings</a></p>\
         </body></html>"
    );
    (jar, Html(body)).into_response()
}
