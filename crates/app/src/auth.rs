//! Session against the identity provider (Keycloak-compatible OpenID Connect).
//!
//! The CLI never sees a password. It starts from the tokens stored in the
//! settings, keeps the access token fresh with the refresh grant and drops
//! the session when refreshing fails.

use std::{collections::HashMap, sync::Arc, time::Duration};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use reqwest::{Client, Url, header};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::settings::AuthSettings;

/// Seconds of validity the refresh loop asks for.
pub const REFRESH_MIN_VALIDITY: i64 = 60;
/// Seconds of validity a request asks for before it is sent.
pub const REQUEST_MIN_VALIDITY: i64 = 30;

const MIN_REFRESH_DELAY: Duration = Duration::from_secs(10);
const FALLBACK_REFRESH_DELAY: Duration = Duration::from_secs(60);
const REFRESH_MARGIN_SECS: i64 = 45;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("not logged in")]
    NotAuthenticated,
    #[error("session expired, please log in again")]
    SessionExpired,
    #[error("malformed token: {0}")]
    Token(String),
    #[error("identity provider error: {0}")]
    Provider(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Access {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// The part of the access token payload the client reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Claims {
    pub exp: Option<i64>,
    pub preferred_username: Option<String>,
    pub email: Option<String>,
    pub realm_access: Option<Access>,
    #[serde(default)]
    pub resource_access: HashMap<String, Access>,
}

/// Reads the payload segment of a JWT. The signature is the server's
/// business; it is not checked here.
pub fn decode_claims(token: &str) -> Result<Claims, AuthError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::Token("expected three segments".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|err| AuthError::Token(err.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|err| AuthError::Token(err.to_string()))
}

/// Wait before the next refresh: `exp - now - 45s`, at least 10s, or 60s
/// when the token does not say when it expires.
pub fn refresh_delay(exp: Option<i64>, now: i64) -> Duration {
    match exp {
        Some(exp) => {
            let secs = exp - now - REFRESH_MARGIN_SECS;
            Duration::from_secs(secs.max(0) as u64).max(MIN_REFRESH_DELAY)
        }
        None => FALLBACK_REFRESH_DELAY,
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: String,
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct Tokens {
    access: String,
    refresh: Option<String>,
    claims: Claims,
}

#[derive(Debug)]
pub struct Auth {
    http: Client,
    settings: AuthSettings,
    tokens: Mutex<Option<Tokens>>,
    /// Held for a whole refresh so concurrent callers share one grant.
    /// `tokens` itself is never locked across a network call.
    refreshing: Mutex<()>,
}

impl Auth {
    pub fn new(http: Client, settings: AuthSettings) -> Self {
        Self {
            http,
            settings,
            tokens: Mutex::new(None),
            refreshing: Mutex::new(()),
        }
    }

    fn realm_url(&self, path: &str) -> String {
        format!(
            "{}/realms/{}/{}",
            self.settings.url.trim_end_matches('/'),
            self.settings.realm,
            path.trim_start_matches('/')
        )
    }

    /// Loads the stored tokens and refreshes them when they are about to
    /// expire. Returns whether a session exists afterwards.
    pub async fn init(&self) -> Result<bool, AuthError> {
        let access = self.settings.access_token.clone().filter(|t| !t.is_empty());
        let refresh = self.settings.refresh_token.clone().filter(|t| !t.is_empty());
        if access.is_none() && refresh.is_none() {
            return Ok(false);
        }

        let claims = match access.as_deref() {
            Some(token) => decode_claims(token)?,
            None => Claims::default(),
        };
        *self.tokens.lock().await = Some(Tokens {
            access: access.unwrap_or_default(),
            refresh,
            claims,
        });

        match self.update_token(REQUEST_MIN_VALIDITY).await {
            Ok(_) => Ok(true),
            Err(AuthError::SessionExpired) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.tokens.lock().await.is_some()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.tokens
            .lock()
            .await
            .as_ref()
            .map(|tokens| tokens.access.clone())
            .filter(|token| !token.is_empty())
    }

    /// Refreshes the access token if it expires within `min_validity`
    /// seconds. Returns `true` when a refresh happened.
    pub async fn update_token(&self, min_validity: i64) -> Result<bool, AuthError> {
        self.update_token_at(min_validity, Utc::now().timestamp()).await
    }

    async fn update_token_at(&self, min_validity: i64, now: i64) -> Result<bool, AuthError> {
        let _refreshing = self.refreshing.lock().await;
        let refresh = {
            let mut guard = self.tokens.lock().await;
            let Some(tokens) = guard.as_ref() else {
                return Err(AuthError::NotAuthenticated);
            };
            let expiring = tokens.access.is_empty()
                || tokens.claims.exp.is_some_and(|exp| exp - now < min_validity);
            if !expiring {
                return Ok(false);
            }
            match tokens.refresh.clone() {
                Some(refresh) => refresh,
                None => {
                    tracing::error!("access token expired and no refresh token is stored");
                    *guard = None;
                    return Err(AuthError::SessionExpired);
                }
            }
        };

        let granted = self.refresh_grant(&refresh).await;

        let mut guard = self.tokens.lock().await;
        // Logged out while the grant was pending.
        let Some(tokens) = guard
            .as_mut()
            .filter(|tokens| tokens.refresh.as_deref() == Some(refresh.as_str()))
        else {
            return Err(AuthError::NotAuthenticated);
        };
        match granted {
            Ok(response) => {
                let claims = decode_claims(&response.access_token)?;
                tokens.access = response.access_token;
                tokens.claims = claims;
                if response.refresh_token.is_some() {
                    tokens.refresh = response.refresh_token;
                }
                tracing::debug!("access token refreshed");
                Ok(true)
            }
            Err(err) => {
                tracing::error!("token refresh failed: {err}");
                *guard = None;
                Err(AuthError::SessionExpired)
            }
        }
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let res = self
            .http
            .post(self.realm_url("protocol/openid-connect/token"))
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.settings.client_id.as_str()),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        if res.status().is_success() {
            return Ok(res.json::<TokenResponse>().await?);
        }
        let status = res.status();
        let message = match res.json::<ProviderError>().await {
            Ok(err) => err.error_description.unwrap_or(err.error),
            Err(_) => status.to_string(),
        };
        Err(AuthError::Provider(message))
    }

    /// Authorization URL of the standard flow. The user opens it in a
    /// browser and brings the tokens back into the settings.
    pub fn login_url(&self, redirect_uri: &str) -> Result<Url, AuthError> {
        Url::parse_with_params(
            &self.realm_url("protocol/openid-connect/auth"),
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", "openid"),
            ],
        )
        .map_err(|err| AuthError::Provider(format!("invalid identity provider url: {err}")))
    }

    /// Ends the session at the provider and forgets the tokens locally, even
    /// when the provider cannot be reached.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let Some(tokens) = self.tokens.lock().await.take() else {
            return Ok(());
        };
        let Some(refresh) = tokens.refresh else {
            return Ok(());
        };
        let res = self
            .http
            .post(self.realm_url("protocol/openid-connect/logout"))
            .form(&[
                ("client_id", self.settings.client_id.as_str()),
                ("refresh_token", refresh.as_str()),
            ])
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(AuthError::Provider(format!("logout returned {}", res.status())));
        }
        Ok(())
    }

    pub async fn load_user_profile(&self) -> Result<UserProfile, AuthError> {
        let token = self.access_token().await.ok_or(AuthError::NotAuthenticated)?;
        let res = self
            .http
            .get(self.realm_url("account"))
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(AuthError::Provider(format!(
                "profile request returned {}",
                res.status()
            )));
        }
        Ok(res.json::<UserProfile>().await?)
    }

    pub async fn claims(&self) -> Option<Claims> {
        self.tokens
            .lock()
            .await
            .as_ref()
            .map(|tokens| tokens.claims.clone())
    }

    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims()
            .await
            .and_then(|claims| claims.exp)
            .and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    pub async fn realm_roles(&self) -> Vec<String> {
        self.claims()
            .await
            .and_then(|claims| claims.realm_access)
            .map(|access| access.roles)
            .unwrap_or_default()
    }

    /// Roles granted by every client, keyed by client id.
    pub async fn client_roles(&self) -> HashMap<String, Vec<String>> {
        self.claims()
            .await
            .map(|claims| {
                claims
                    .resource_access
                    .into_iter()
                    .map(|(client, access)| (client, access.roles))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `true` when the role is granted by the realm or by any client.
    pub async fn has_role(&self, role: &str) -> bool {
        let Some(claims) = self.claims().await else {
            return false;
        };
        let in_realm = claims
            .realm_access
            .is_some_and(|access| access.roles.iter().any(|r| r == role));
        in_realm
            || claims
                .resource_access
                .values()
                .any(|access| access.roles.iter().any(|r| r == role))
    }
}

/// Keeps the session fresh until it ends.
pub async fn run_refresh_loop(auth: Arc<Auth>) {
    loop {
        if let Err(err) = auth.update_token(REFRESH_MIN_VALIDITY).await {
            tracing::error!("session ended: {err}");
            return;
        }
        let exp = auth.claims().await.and_then(|claims| claims.exp);
        let delay = refresh_delay(exp, Utc::now().timestamp());
        tracing::debug!(?delay, "next token refresh scheduled");
        tokio::time::sleep(delay).await;
    }
}
