//! Credential types and the wire payloads of the auth endpoints.
//!
//! A `CredentialPair` is immutable once issued: every login or renewal
//! replaces it wholesale. The expiry instant is derived from the
//! server-declared lifetime at the moment the pair is issued, never
//! reconstructed from a relative counter later.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::User;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CredentialPair {
    /// Build a pair from a server-declared lifetime in seconds, anchoring
    /// the expiry at the issue instant.
    pub fn issue(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Check if the pair is close enough to expiry that a renewal is due.
    pub fn is_renewal_due(&self, safety_margin: Duration) -> bool {
        Utc::now() > self.expires_at - safety_margin
    }

    /// Time left before the proactive renewal should fire. Negative when
    /// renewal is already overdue.
    pub fn time_until_renewal(&self, safety_margin: Duration) -> Duration {
        self.expires_at - safety_margin - Utc::now()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Response of the three credential-issuing endpoints (login, register,
/// refresh): identity plus a token pair plus a lifetime in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

impl AuthResponse {
    pub fn into_parts(self) -> (User, CredentialPair) {
        let pair = CredentialPair::issue(self.access_token, self.refresh_token, self.expires_in);
        (self.user, pair)
    }
}
