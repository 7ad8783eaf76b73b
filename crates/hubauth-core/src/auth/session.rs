use std::sync::Arc;

use anyhow::Context;
use reqwest::StatusCode;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::error::response_details;
use super::grant;
use super::{AuthError, AuthParams, User};
use crate::api::{HttpRequest, HttpTransport};
use crate::cache::KeyValueStore;
use crate::config::AppConfig;

/// Store key holding the serialized `AuthParams`
pub const AUTH_PARAMS_KEY: &str = "auth_params";

/// Fields requested from `users/me`
pub const USER_FIELDS: &str = "id,guest,name,login,profile/avatar/url";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Refreshing,
}

/// Outcome of a single "who am I" request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenCheck {
    Valid(User),
    /// The backend answered 401
    Expired,
}

/// Outcome of `AuthSession::verify_token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid(User),
    /// The token had expired and was replaced by this one
    Refreshed(AuthParams),
}

/// Owns the current hub credential.
///
/// Readers get clones of the credential. Refreshes are serialised behind
/// `refresh_gate`; a caller that finds the credential already replaced while
/// it waited returns the replacement without another token request.
pub struct AuthSession {
    config: AppConfig,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn KeyValueStore>,
    current: RwLock<Option<AuthParams>>,
    refresh_gate: Mutex<()>,
}

impl AuthSession {
    pub fn new(
        config: AppConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            config,
            transport,
            store,
            current: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn current(&self) -> Option<AuthParams> {
        self.current.read().await.clone()
    }

    /// Snapshot of the lifecycle state; it may be stale as soon as it returns.
    pub async fn state(&self) -> SessionState {
        if self.refresh_gate.try_lock().is_err() {
            return SessionState::Refreshing;
        }
        if self.current.read().await.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }

    /// `Authorization` header value for API calls made with the current credential
    pub async fn authorization_header(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(AuthParams::authorization_header)
    }

    // =========================================================================
    // Store accessors
    // =========================================================================

    pub async fn get_cached_auth_params(&self) -> Result<Option<AuthParams>, AuthError> {
        let Some(raw) = self.store.get(AUTH_PARAMS_KEY).await.map_err(AuthError::Store)? else {
            return Ok(None);
        };
        let params = serde_json::from_str(&raw)
            .context("Failed to parse cached auth params")
            .map_err(AuthError::Store)?;
        Ok(Some(params))
    }

    /// Store `params` and return the value the store now holds
    pub async fn cache_auth_params(&self, params: &AuthParams) -> Result<AuthParams, AuthError> {
        let raw = serde_json::to_string(params)
            .context("Failed to serialize auth params")
            .map_err(AuthError::Store)?;
        let stored = self
            .store
            .set(AUTH_PARAMS_KEY, raw)
            .await
            .map_err(AuthError::Store)?;
        serde_json::from_str(&stored)
            .context("Store returned unreadable auth params")
            .map_err(AuthError::Store)
    }

    // =========================================================================
    // Becoming authenticated
    // =========================================================================

    /// Adopt the cached credential, if there is one
    pub async fn load_from_cache(&self) -> Result<Option<AuthParams>, AuthError> {
        let cached = self.get_cached_auth_params().await?;
        match cached {
            Some(ref params) => {
                debug!(expired = params.is_expired(), "Cached credential loaded");
                *self.current.write().await = Some(params.clone());
            }
            None => debug!("No cached credential"),
        }
        Ok(cached)
    }

    pub async fn login(&self, login: &str, password: &str) -> Result<AuthParams, AuthError> {
        let params =
            grant::obtain_token_by_credentials(self.transport.as_ref(), &self.config.auth, login, password)
                .await?;
        Ok(self.adopt(params).await)
    }

    pub async fn login_with_code(&self, code: &str) -> Result<AuthParams, AuthError> {
        let params =
            grant::obtain_token_by_oauth_code(self.transport.as_ref(), &self.config.auth, code).await?;
        Ok(self.adopt(params).await)
    }

    /// URL to send the user to for the code flow
    pub fn authorization_url(&self, state: &str) -> String {
        grant::authorization_url(&self.config.auth, state)
    }

    /// Cache a freshly granted credential and make it current.
    /// A store failure is logged; the credential is still usable for this run.
    async fn adopt(&self, params: AuthParams) -> AuthParams {
        let params = match self.cache_auth_params(&params).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to cache credential");
                params
            }
        };
        *self.current.write().await = Some(params.clone());
        params
    }

    /// Forget the credential in memory and in the store
    pub async fn logout(&self) -> Result<(), AuthError> {
        *self.current.write().await = None;
        self.store
            .remove(AUTH_PARAMS_KEY)
            .await
            .map_err(AuthError::Store)?;
        info!("Logged out");
        Ok(())
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// One `users/me` request with `params`, without refreshing
    pub async fn check_token(&self, params: &AuthParams) -> Result<TokenCheck, AuthError> {
        let url = format!(
            "{}/api/rest/users/me?fields={}",
            self.config.backend_url.trim_end_matches('/'),
            USER_FIELDS
        );
        let request = HttpRequest::get(url).header("Authorization", params.authorization_header());
        let response = self.transport.send(request).await?;

        if response.status == StatusCode::UNAUTHORIZED {
            return Ok(TokenCheck::Expired);
        }
        if !response.status.is_success() {
            return Err(AuthError::Verification {
                status: response.status,
                details: response_details(&response.body),
            });
        }

        let user: User = response
            .json()
            .map_err(|e| AuthError::InvalidResponse(format!("users/me response: {}", e)))?;
        Ok(TokenCheck::Valid(user))
    }

    /// Check `params`; on 401 refresh exactly once.
    ///
    /// A verified credential becomes the current one.
    ///
    /// A failed refresh ends the session: the credential is dropped from memory
    /// (the stored copy is kept) and the refresh error is returned.
    pub async fn verify_token(&self, params: &AuthParams) -> Result<Verification, AuthError> {
        match self.check_token(params).await? {
            TokenCheck::Valid(user) => {
                *self.current.write().await = Some(params.clone());
                debug!(user = %user.id, "Token verified");
                Ok(Verification::Valid(user))
            }
            TokenCheck::Expired => {
                info!("Token expired, refreshing");
                match self.refresh_from(params.clone()).await {
                    Ok(refreshed) => Ok(Verification::Refreshed(refreshed)),
                    Err(e) => {
                        warn!(error = %e, "Refresh after 401 failed");
                        self.discard(params).await;
                        Err(e)
                    }
                }
            }
        }
    }

    /// Drop the current credential if it is still `stale`
    async fn discard(&self, stale: &AuthParams) {
        let mut current = self.current.write().await;
        if current
            .as_ref()
            .is_some_and(|c| c.access_token == stale.access_token)
        {
            *current = None;
        }
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Exchange the refresh token of the current (or cached) credential.
    ///
    /// On failure the current and cached credentials are left as they were.
    pub async fn refresh_token(&self) -> Result<AuthParams, AuthError> {
        let stale = match self.current().await {
            Some(params) => params,
            None => self
                .get_cached_auth_params()
                .await?
                .ok_or(AuthError::NotAuthenticated)?,
        };
        self.refresh_from(stale).await
    }

    async fn refresh_from(&self, stale: AuthParams) -> Result<AuthParams, AuthError> {
        let _gate = self.refresh_gate.lock().await;

        if let Some(current) = self.current().await {
            if current.access_token != stale.access_token {
                debug!("Credential already refreshed by a concurrent caller");
                return Ok(current);
            }
        }

        let refresh_token = stale
            .refresh_token
            .as_deref()
            .ok_or(AuthError::MissingRefreshToken)?;
        let mut params =
            grant::refresh_access_token(self.transport.as_ref(), &self.config.auth, refresh_token)
                .await?;
        // The hub may omit the refresh token on a refresh grant; keep using the old one
        if params.refresh_token.is_none() {
            params.refresh_token = stale.refresh_token.clone();
        }

        let params = self.adopt(params).await;
        info!("Token refreshed");
        Ok(params)
    }
}
