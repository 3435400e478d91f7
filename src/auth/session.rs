//! Session store holding the active credential pair

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// The active access/refresh token pair with expiry metadata.
///
/// At most one pair is valid at a time; replacing it invalidates the previous
/// pair for all future requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    /// Bearer token sent with API requests
    pub access_token: String,
    /// Opaque token sent to the refresh endpoint
    pub refresh_token: String,
    /// Access token expiry, if the auth server reports one
    #[serde(default)]
    pub access_expires_at: Option<DateTime<Utc>>,
    /// Refresh token expiry, if the auth server reports one
    #[serde(default)]
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

/// Authenticated principal as reported by the auth endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Login name
    pub username: String,
    /// Display name, if set
    #[serde(default)]
    pub display_name: Option<String>,
    /// Granted roles
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Credential shape issued by `POST /auth/token` and `POST /auth/refresh`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    /// Newly issued access token
    pub access_token: String,
    /// Newly issued refresh token
    pub refresh_token: String,
    /// Access token expiry
    #[serde(default)]
    pub access_expires_at: Option<DateTime<Utc>>,
    /// Refresh token expiry
    #[serde(default)]
    pub refresh_expires_at: Option<DateTime<Utc>>,
    /// Principal the grant was issued to
    #[serde(default)]
    pub principal: Option<Principal>,
}

impl From<TokenGrant> for CredentialPair {
    fn from(grant: TokenGrant) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            access_expires_at: grant.access_expires_at,
            refresh_expires_at: grant.refresh_expires_at,
        }
    }
}

/// Thread-safe holder for the current credential pair.
///
/// All reads and writes go through this store; the pair is swapped as a unit
/// so no request can observe a half-replaced credential.
#[derive(Debug, Default)]
pub struct SessionStore {
    current: RwLock<Option<CredentialPair>>,
}

impl SessionStore {
    /// Create an empty (anonymous) session store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current access token, if a session is active
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .map(|pair| pair.access_token.clone())
    }

    /// Current refresh token, if a session is active
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .map(|pair| pair.refresh_token.clone())
    }

    /// Snapshot of the current pair
    #[must_use]
    pub fn current(&self) -> Option<CredentialPair> {
        self.current.read().clone()
    }

    /// Atomically replace the active pair, invalidating the previous one
    pub fn replace(&self, pair: CredentialPair) {
        *self.current.write() = Some(pair);
    }

    /// Clear the session (logout or irrecoverable refresh failure)
    pub fn clear(&self) {
        *self.current.write() = None;
    }

    /// Whether a credential pair is currently held
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }
}
