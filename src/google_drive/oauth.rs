//! OAuth2 token lifecycle against the Google token endpoint.
//!
//! The authorization URL is built with the `oauth2` crate's typed client;
//! token exchange and refresh are plain form-encoded POSTs so a failed
//! provider response surfaces its body verbatim.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use oauth2::{AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope, basic::BasicClient};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;
use url::Url;

use super::DriveEndpoints;
use crate::error::DriveError;

/// Safety margin subtracted from a token's expiry before a proactive refresh.
pub const DEFAULT_REFRESH_SKEW_SECS: i64 = 120;

/// Assumed token lifetime when the provider omits `expires_in`.
const FALLBACK_EXPIRES_IN_SECS: i64 = 3600;

const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Token material held in memory for the duration of one triggering request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OAuthTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Manages one credential set: builds authorization URLs, exchanges codes,
/// and transparently refreshes expiring access tokens.
pub struct OAuthManager {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    endpoints: DriveEndpoints,
    tokens: OAuthTokens,
    refreshed: bool,
}

impl OAuthManager {
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        tokens: OAuthTokens,
        endpoints: DriveEndpoints,
    ) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(METADATA_TIMEOUT)
            .build()
            .expect("FATAL: initialize OAuth HTTP client failed");
        Self {
            http,
            client_id,
            client_secret,
            redirect_uri,
            endpoints,
            tokens,
            refreshed: false,
        }
    }

    pub fn tokens(&self) -> &OAuthTokens {
        &self.tokens
    }

    /// Whether `ensure_valid_token` performed a refresh since construction.
    /// Callers persist the updated pair before returning control.
    pub fn was_refreshed(&self) -> bool {
        self.refreshed
    }

    /// The (access token, expiry) pair to write back after a refresh.
    pub fn token_update(&self) -> Option<(&str, DateTime<Utc>)> {
        if !self.refreshed {
            return None;
        }
        match (&self.tokens.access_token, self.tokens.expires_at) {
            (Some(token), Some(expiry)) => Some((token.as_str(), expiry)),
            _ => None,
        }
    }

    /// Pure construction of the provider authorization URL. No side effects,
    /// no network.
    pub fn build_auth_url(&self, scopes: &[String], state: &str) -> Result<Url, DriveError> {
        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_auth_uri(AuthUrl::new(self.endpoints.auth_url.clone())?)
            .set_redirect_uri(RedirectUrl::new(self.redirect_uri.clone())?);

        let state = state.to_owned();
        let (url, _csrf) = client
            .authorize_url(move || CsrfToken::new(state.clone()))
            .add_scopes(scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .add_extra_param("include_granted_scopes", "true")
            .url();
        Ok(url)
    }

    /// Exchange an authorization code for tokens. A non-success response
    /// fails with the raw body as the error message.
    pub async fn exchange_code_for_token(
        &self,
        code: &str,
    ) -> Result<TokenResponse, DriveError> {
        let resp = self
            .http
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DriveError::Auth(body));
        }
        Ok(resp.json().await?)
    }

    /// Refresh the access token with the held refresh token. Missing refresh
    /// token is a precondition failure, not a network failure.
    pub async fn refresh_access_token(&self) -> Result<TokenResponse, DriveError> {
        let refresh_token = self
            .tokens
            .refresh_token
            .as_deref()
            .ok_or_else(|| DriveError::Auth("missing refresh token".to_string()))?;

        let resp = self
            .http
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DriveError::Auth(body));
        }
        Ok(resp.json().await?)
    }

    /// Apply a token response to the in-memory state and mark it for
    /// persistence.
    pub fn apply_refresh(&mut self, token: TokenResponse) {
        let expires_in = token.expires_in.unwrap_or(FALLBACK_EXPIRES_IN_SECS);
        self.tokens.access_token = Some(token.access_token);
        if token.refresh_token.is_some() {
            self.tokens.refresh_token = token.refresh_token;
        }
        self.tokens.expires_at = Some(Utc::now() + ChronoDuration::seconds(expires_in));
        self.refreshed = true;
        info!("access token refreshed");
    }

    pub async fn ensure_valid_token(&mut self) -> Result<(), DriveError> {
        self.ensure_valid_token_with_skew(DEFAULT_REFRESH_SKEW_SECS)
            .await
    }

    /// Refresh when `now + skew` reaches the known expiry. A token with no
    /// recorded expiry is assumed valid; a provider-side invalidation then
    /// only shows up on the next failing API call.
    pub async fn ensure_valid_token_with_skew(
        &mut self,
        skew_seconds: i64,
    ) -> Result<(), DriveError> {
        if self.tokens.access_token.is_none() {
            return Err(DriveError::Auth("not connected".to_string()));
        }

        let Some(expires_at) = self.tokens.expires_at else {
            return Ok(());
        };

        if Utc::now() + ChronoDuration::seconds(skew_seconds) >= expires_at {
            let token = self.refresh_access_token().await?;
            self.apply_refresh(token);
        }
        Ok(())
    }

    /// Used by test-connection: a held refresh token is enough to get going
    /// even when no access token survived.
    pub async fn ensure_token_available(&mut self) -> Result<(), DriveError> {
        if self.tokens.access_token.is_none() && self.tokens.refresh_token.is_some() {
            let token = self.refresh_access_token().await?;
            self.apply_refresh(token);
            return Ok(());
        }
        self.ensure_valid_token().await
    }

    /// Bearer token for an authenticated call, refreshing first if needed.
    pub async fn bearer(&mut self) -> Result<String, DriveError> {
        self.ensure_valid_token().await?;
        Ok(self
            .tokens
            .access_token
            .clone()
            .expect("access token present after ensure_valid_token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manager(tokens: OAuthTokens, endpoints: DriveEndpoints) -> OAuthManager {
        OAuthManager::new(
            "cid".to_string(),
            "csecret".to_string(),
            "https://example.com/drive/callback".to_string(),
            tokens,
            endpoints,
        )
    }

    fn offline_manager(tokens: OAuthTokens) -> OAuthManager {
        manager(tokens, DriveEndpoints::default())
    }

    #[test]
    fn auth_url_contains_every_parameter_exactly_once() {
        let m = offline_manager(OAuthTokens::default());
        let url = m
            .build_auth_url(
                &[super::super::DRIVE_SCOPE.to_string()],
                "state-token-1",
            )
            .unwrap();

        assert!(url.as_str().starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));

        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut values: HashMap<String, String> = HashMap::new();
        for (k, v) in url.query_pairs() {
            *counts.entry(k.to_string()).or_default() += 1;
            values.insert(k.to_string(), v.to_string());
        }
        for key in [
            "client_id",
            "redirect_uri",
            "response_type",
            "scope",
            "access_type",
            "prompt",
            "include_granted_scopes",
            "state",
        ] {
            assert_eq!(counts.get(key), Some(&1), "param {key}");
        }
        assert_eq!(values["response_type"], "code");
        assert_eq!(values["access_type"], "offline");
        assert_eq!(values["prompt"], "consent");
        assert_eq!(values["include_granted_scopes"], "true");
        assert_eq!(values["state"], "state-token-1");
        assert_eq!(values["scope"], super::super::DRIVE_SCOPE);
        // Space-joined scopes stay URL-encoded in the raw string.
        assert!(url.as_str().contains("redirect_uri=https%3A%2F%2F"));
    }

    #[test]
    fn auth_url_is_deterministic() {
        let m = offline_manager(OAuthTokens::default());
        let scopes = vec![super::super::DRIVE_SCOPE.to_string()];
        let a = m.build_auth_url(&scopes, "s").unwrap();
        let b = m.build_auth_url(&scopes, "s").unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn ensure_valid_token_fails_without_access_token() {
        let mut m = offline_manager(OAuthTokens::default());
        let err = m.ensure_valid_token().await.unwrap_err();
        assert!(matches!(err, DriveError::Auth(msg) if msg == "not connected"));
    }

    #[tokio::test]
    async fn unexpired_token_is_never_refreshed() {
        let server = MockServer::start().await;
        // No mock mounted: any token-endpoint hit would 404 and fail below.
        let mut m = manager(
            OAuthTokens {
                access_token: Some("tok".into()),
                refresh_token: Some("ref".into()),
                expires_at: Some(Utc::now() + ChronoDuration::hours(1)),
            },
            DriveEndpoints::with_base(&server.uri()),
        );
        m.ensure_valid_token().await.unwrap();
        assert!(!m.was_refreshed());
        assert_eq!(m.tokens().access_token.as_deref(), Some("tok"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn token_without_expiry_is_assumed_valid() {
        let server = MockServer::start().await;
        let mut m = manager(
            OAuthTokens {
                access_token: Some("tok".into()),
                refresh_token: Some("ref".into()),
                expires_at: None,
            },
            DriveEndpoints::with_base(&server.uri()),
        );
        m.ensure_valid_token().await.unwrap();
        assert!(!m.was_refreshed());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_exactly_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=ref"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut m = manager(
            OAuthTokens {
                access_token: Some("stale".into()),
                refresh_token: Some("ref".into()),
                expires_at: Some(Utc::now() + ChronoDuration::seconds(30)),
            },
            DriveEndpoints::with_base(&server.uri()),
        );
        m.ensure_valid_token().await.unwrap();

        assert!(m.was_refreshed());
        assert_eq!(m.tokens().access_token.as_deref(), Some("fresh"));
        // Refresh kept the original refresh token when none was returned.
        assert_eq!(m.tokens().refresh_token.as_deref(), Some("ref"));
        let (token, expiry) = m.token_update().unwrap();
        assert_eq!(token, "fresh");
        assert!(expiry > Utc::now() + ChronoDuration::minutes(50));

        // A second call sees the fresh expiry and does not refresh again.
        m.ensure_valid_token().await.unwrap();
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_is_a_precondition_failure() {
        let m = offline_manager(OAuthTokens {
            access_token: Some("tok".into()),
            refresh_token: None,
            expires_at: None,
        });
        let err = m.refresh_access_token().await.unwrap_err();
        assert!(matches!(err, DriveError::Auth(msg) if msg == "missing refresh token"));
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .mount(&server)
            .await;

        let m = manager(
            OAuthTokens {
                access_token: None,
                refresh_token: Some("revoked".into()),
                expires_at: None,
            },
            DriveEndpoints::with_base(&server.uri()),
        );
        let err = m.refresh_access_token().await.unwrap_err();
        assert!(matches!(err, DriveError::Auth(msg) if msg.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn exchange_code_posts_authorization_code_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at",
                "refresh_token": "rt",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        let m = manager(
            OAuthTokens::default(),
            DriveEndpoints::with_base(&server.uri()),
        );
        let token = m.exchange_code_for_token("abc").await.unwrap();
        assert_eq!(token.access_token, "at");
        assert_eq!(token.refresh_token.as_deref(), Some("rt"));
        assert_eq!(token.expires_in, Some(3599));
    }

    #[tokio::test]
    async fn ensure_token_available_refreshes_with_only_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "revived",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut m = manager(
            OAuthTokens {
                access_token: None,
                refresh_token: Some("ref".into()),
                expires_at: None,
            },
            DriveEndpoints::with_base(&server.uri()),
        );
        m.ensure_token_available().await.unwrap();
        assert_eq!(m.tokens().access_token.as_deref(), Some("revived"));
        assert!(m.was_refreshed());
    }
}
