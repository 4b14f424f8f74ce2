//! Action-level operations behind the integration endpoints: authorization
//! URL construction, the callback exchange, and connection testing.

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use url::Url;

use crate::db::IntegrationStore;
use crate::error::DriveError;
use crate::google_drive::oauth::{OAuthManager, OAuthTokens};
use crate::google_drive::{DRIVE_SCOPE, DriveEndpoints};
use crate::orchestrator::{build_drive_client, persist_token_refresh};

/// Build the provider authorization URL. Requires client_id and
/// redirect_uri; the client secret is only needed later, at exchange time.
pub async fn get_auth_url(
    store: &dyn IntegrationStore,
    endpoints: &DriveEndpoints,
    state: &str,
) -> Result<Url, DriveError> {
    let settings = store.load_settings().await?;
    let client_id = settings
        .client_id
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DriveError::Configuration("client_id is not set".to_string()))?;
    let redirect_uri = settings
        .redirect_uri
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DriveError::Configuration("redirect_uri is not set".to_string()))?;

    let oauth = OAuthManager::new(
        client_id,
        settings.client_secret.clone().unwrap_or_default(),
        redirect_uri,
        OAuthTokens::default(),
        endpoints.clone(),
    );
    oauth.build_auth_url(&[DRIVE_SCOPE.to_string()], state)
}

/// Exchange the callback code and persist the resulting tokens. An absent
/// refresh_token in the response leaves any previously stored one in place.
pub async fn complete_callback(
    store: &dyn IntegrationStore,
    endpoints: &DriveEndpoints,
    code: &str,
) -> Result<(), DriveError> {
    let mut settings = store.load_settings().await?;
    let (client_id, client_secret, redirect_uri) = settings.require_client()?;

    let oauth = OAuthManager::new(
        client_id.to_string(),
        client_secret.to_string(),
        redirect_uri.to_string(),
        OAuthTokens::default(),
        endpoints.clone(),
    );
    let token = oauth.exchange_code_for_token(code).await?;

    settings.access_token = Some(token.access_token);
    if token.refresh_token.is_some() {
        settings.refresh_token = token.refresh_token;
    }
    let expires_in = token.expires_in.unwrap_or(3600);
    settings.token_expires_at = Some(Utc::now() + ChronoDuration::seconds(expires_in));
    store.save_settings(&settings).await?;

    if settings.refresh_token.is_none() {
        // Without a refresh token, silent re-auth on expiry is impossible.
        tracing::warn!(
            "token exchange returned no refresh_token; reconnection will be required at expiry"
        );
    }
    info!("Drive connection established");
    Ok(())
}

/// Structured outcome of the test-connection action.
#[derive(Debug, Serialize)]
pub struct TestOutcome {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Verify the stored connection with one lightweight read (list at most one
/// item), refreshing first when only a refresh token is held.
pub async fn test_connection(
    store: &dyn IntegrationStore,
    endpoints: &DriveEndpoints,
) -> Result<TestOutcome, DriveError> {
    let settings = store.load_settings().await?;

    if settings.access_token.is_none() && settings.refresh_token.is_none() {
        return Ok(TestOutcome {
            ok: false,
            message: "Not connected to Google Drive. Authorize the integration first."
                .to_string(),
            data: None,
        });
    }

    let mut client = build_drive_client(&settings, endpoints.clone())?;
    client.oauth_mut().ensure_token_available().await?;
    persist_token_refresh(store, client.oauth()).await?;

    match client.list_one().await {
        Ok(data) => Ok(TestOutcome {
            ok: true,
            message: "Connection OK.".to_string(),
            data: Some(data),
        }),
        Err(err) if err.is_forbidden() => Ok(TestOutcome {
            ok: false,
            message: "Google Drive API is not enabled for this project, or the \
                      authorization has expired. Enable the Drive API in the Google \
                      Cloud console or reconnect."
                .to_string(),
            data: None,
        }),
        Err(err) => Err(err),
    }
}
