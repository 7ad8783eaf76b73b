use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Token type assumed when the hub omits `token_type`
const DEFAULT_TOKEN_TYPE: &str = "bearer";

/// Buffer time before expiry to trigger refresh (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

/// The credential returned by the hub token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AuthParams {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds as reported by the hub
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Stamped locally from `expires_in` when the token is received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthParams {
    pub fn bearer(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            token_type: default_token_type(),
            expires_in: None,
            scope: None,
            expires_at: None,
        }
    }

    /// Fill in `expires_at` from the expiry hint, measured from now
    pub(crate) fn stamped(mut self) -> Self {
        if self.expires_at.is_none() {
            if let Some(secs) = self.expires_in {
                let secs = i64::try_from(secs).unwrap_or(i64::MAX);
                self.expires_at = Duration::try_seconds(secs).and_then(|d| Utc::now().checked_add_signed(d));
            }
        }
        self
    }

    /// Value for the `Authorization` header of API requests
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// True once the expiry hint has passed. Tokens without a hint never expire locally.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    /// Check if the token will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        self.expires_at
            .is_some_and(|at| Utc::now() >= at - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES))
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.expires_at
            .map(|at| (at - Utc::now()).num_minutes().max(0))
    }
}

/// The current user as returned by `users/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub guest: bool,
    #[serde(default)]
    pub profile: Option<UserProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserProfile {
    #[serde(default)]
    pub avatar: Option<Avatar>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Avatar {
    #[serde(default)]
    pub url: Option<String>,
}

impl User {
    pub fn avatar_url(&self) -> Option<&str> {
        self.profile
            .as_ref()
            .and_then(|p| p.avatar.as_ref())
            .and_then(|a| a.url.as_deref())
    }

    /// Name for display, falling back to login and then id
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.login.as_deref())
            .unwrap_or(&self.id)
    }
}
