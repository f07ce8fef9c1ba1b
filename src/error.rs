//! Error taxonomy for the session lifecycle.
//!
//! Login, registration, and identity-update failures are returned to the
//! immediate caller and leave timers and shared state untouched. Renewal
//! failures are terminal for the whole session: they reject every queued
//! waiter and force a logout. Storage failures never appear here at all -
//! the store degrades to memory-only and logs instead.

use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error(transparent)]
    Renewal(#[from] RenewalError),

    #[error("No active session")]
    NotAuthenticated,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Failure of a credential renewal. Cloneable because a single settled
/// renewal is fanned out to every waiter queued behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenewalError {
    #[error("Refresh token rejected: {0}")]
    Rejected(String),

    #[error("Network error during renewal: {0}")]
    Network(String),

    #[error("No active session to renew")]
    NoSession,

    #[error("Renewal interrupted before completion")]
    Interrupted,
}

impl RenewalError {
    pub(crate) fn from_api(err: &ApiError) -> Self {
        match err {
            ApiError::NetworkError(e) => RenewalError::Network(e.to_string()),
            other => RenewalError::Rejected(other.to_string()),
        }
    }
}
