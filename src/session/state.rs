//! Session state machine types.
//!
//! `SessionRecord` is the authoritative in-memory session state, owned
//! exclusively by the facade; every other component sees read-only
//! snapshots. The record is created on login/registration, mutated in place
//! by renewals and activity extensions, and destroyed on logout, renewal
//! failure, or inactivity timeout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{CredentialPair, User};
use crate::store::{CredentialStore, Slot};

/// States of the session lifecycle.
///
/// `Expired` is the transient state entered during startup recovery when a
/// persisted credential is found past its renewal-due threshold: the session
/// is not usable until the renewal settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
    Expired,
}

impl SessionState {
    /// True for the states in which resource requests may be issued.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::Refreshing)
    }
}

/// Why a session ended. Recorded on every teardown transition so hosts can
/// show a reason-specific message on the login surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoutReason {
    Manual,
    Timeout,
    Error,
}

impl LogoutReason {
    pub fn message(&self) -> &'static str {
        match self {
            LogoutReason::Manual => "You have been signed out.",
            LogoutReason::Timeout => "Your session ended due to inactivity. Please sign in again.",
            LogoutReason::Error => "Your session could not be renewed. Please sign in again.",
        }
    }
}

/// The authoritative session state: identity, credential pair, a session id
/// stable across renewals, and the last-activity instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub identity: User,
    pub credentials: CredentialPair,
    pub session_id: String,
    pub last_activity: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a record for a fresh login or registration. The session id is
    /// generated here, once, and survives every renewal within this login.
    pub fn new(identity: User, credentials: CredentialPair) -> Self {
        Self {
            identity,
            credentials,
            session_id: generate_session_id(),
            last_activity: Utc::now(),
        }
    }

    /// Persist every slot to the store selected by `remember`.
    pub(crate) fn write_slots(&self, store: &CredentialStore, remember: bool) {
        store.write(Slot::AccessToken, &self.credentials.access_token, remember);
        store.write(Slot::RefreshToken, &self.credentials.refresh_token, remember);
        store.write(Slot::ExpiresAt, &self.credentials.expires_at.to_rfc3339(), remember);
        store.write(Slot::SessionId, &self.session_id, remember);
        if let Ok(identity) = serde_json::to_string(&self.identity) {
            store.write(Slot::Identity, &identity, remember);
        }
        store.write(Slot::Remember, if remember { "true" } else { "false" }, remember);
        store.write(Slot::LastActivity, &self.last_activity.to_rfc3339(), remember);
    }

    /// Reconstruct a record from storage, probing durable then ephemeral.
    /// Returns the record and the remember flag it was persisted with, or
    /// `None` when any essential slot is missing or unparseable.
    pub(crate) fn load_slots(store: &CredentialStore) -> Option<(Self, bool)> {
        let access_token = store.read(Slot::AccessToken)?;
        let refresh_token = store.read(Slot::RefreshToken)?;
        let expires_at: DateTime<Utc> = store.read(Slot::ExpiresAt)?.parse().ok()?;
        let session_id = store.read(Slot::SessionId)?;
        let identity: User = serde_json::from_str(&store.read(Slot::Identity)?).ok()?;
        let last_activity: DateTime<Utc> = store.read(Slot::LastActivity)?.parse().ok()?;
        let remember = store
            .read(Slot::Remember)
            .map(|v| v == "true")
            .unwrap_or(false);

        Some((
            Self {
                identity,
                credentials: CredentialPair {
                    access_token,
                    refresh_token,
                    expires_at,
                },
                session_id,
                last_activity,
            },
            remember,
        ))
    }
}

/// Read-only view handed to callers of `current_state()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub identity: Option<User>,
    pub is_authenticated: bool,
    pub is_credential_expired: bool,
}

/// 128-bit random hex id, generated once per login.
fn generate_session_id() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CredentialStore;

    fn test_user() -> User {
        User {
            id: "u-1".to_string(),
            email: "ada@example.com".to_string(),
            display_name: Some("Ada".to_string()),
        }
    }

    fn test_record() -> SessionRecord {
        SessionRecord::new(
            test_user(),
            CredentialPair::issue("acc".into(), "ref".into(), 3600),
        )
    }

    #[test]
    fn test_session_id_format() {
        let record = test_record();
        assert_eq!(record.session_id.len(), 32);
        assert!(record.session_id.chars().all(|c| c.is_ascii_hexdigit()));

        let other = test_record();
        assert_ne!(record.session_id, other.session_id);
    }

    #[test]
    fn test_slot_round_trip() {
        let store = CredentialStore::in_memory();
        let record = test_record();
        record.write_slots(&store, true);

        let (loaded, remember) = SessionRecord::load_slots(&store).expect("load slots");
        assert!(remember);
        assert_eq!(loaded.session_id, record.session_id);
        assert_eq!(loaded.identity, record.identity);
        assert_eq!(loaded.credentials.access_token, "acc");
        // RFC 3339 round-trip preserves the instant
        assert_eq!(loaded.credentials.expires_at, record.credentials.expires_at);
    }

    #[test]
    fn test_load_slots_missing_essential_slot() {
        let store = CredentialStore::in_memory();
        let record = test_record();
        record.write_slots(&store, false);
        store.clear();
        store.write(Slot::AccessToken, "orphan", false);

        assert!(SessionRecord::load_slots(&store).is_none());
    }

    #[test]
    fn test_state_activity() {
        assert!(SessionState::Authenticated.is_active());
        assert!(SessionState::Refreshing.is_active());
        assert!(!SessionState::Unauthenticated.is_active());
        assert!(!SessionState::Expired.is_active());
    }

    #[test]
    fn test_logout_reason_messages_distinct() {
        let reasons = [LogoutReason::Manual, LogoutReason::Timeout, LogoutReason::Error];
        for a in &reasons {
            for b in &reasons {
                if a != b {
                    assert_ne!(a.message(), b.message());
                }
            }
        }
    }
}
