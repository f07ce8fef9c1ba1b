//! Transport seam between the session core and the Taskdeck server.
//!
//! The facade and renewal coordinator only ever talk to this trait. The
//! production implementation is [`ApiClient`](super::ApiClient); tests
//! script the server by implementing it in-process.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::models::{AuthResponse, LoginRequest, RegisterRequest};

use super::ApiError;

/// An application-level request routed through the authorized transport.
/// The facade attaches the current access token and re-issues the request
/// at most once after a renewal.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ResourceRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Server boundary consumed by the session core: three credential-issuing
/// endpoints, session invalidation, and authenticated resource calls.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    /// Issue credentials for an existing account.
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError>;

    /// Create an account and issue credentials for it.
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError>;

    /// Exchange a refresh token for a new credential pair.
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ApiError>;

    /// Invalidate the session server-side.
    async fn logout(&self, access_token: &str) -> Result<(), ApiError>;

    /// Send an authenticated resource request. Must report a rejected
    /// access token as `ApiError::Unauthorized`, distinguishable from
    /// every other failure.
    async fn send(
        &self,
        access_token: &str,
        request: &ResourceRequest,
    ) -> Result<Value, ApiError>;
}
