//! HTTP client for the Taskdeck REST API.
//!
//! This module provides the `ApiClient` implementation of
//! [`AuthTransport`]: the four auth endpoints plus authenticated resource
//! requests, with bearer credentials attached by the caller per request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::models::{AuthResponse, LoginRequest, RegisterRequest};

use super::{ApiError, AuthTransport, ResourceRequest};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
/// 1 second is polite to the server while not making users wait too long.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the Taskdeck server.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit
    /// (should retry), or Err for other errors.
    async fn check_response_for_retry(response: Response) -> Result<Option<Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            // Rate limited - signal to retry
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send a request, retrying on 429 with exponential backoff, and parse
    /// the JSON body of the successful response.
    async fn send_json(&self, build: impl Fn() -> RequestBuilder) -> Result<Value, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    if response.status().as_u16() == 204 {
                        return Ok(Value::Null);
                    }
                    return response
                        .json()
                        .await
                        .map_err(|e| ApiError::InvalidResponse(e.to_string()));
                }
                None => {
                    // Rate limited
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn issue_credentials(
        &self,
        path: &str,
        body: Value,
    ) -> Result<AuthResponse, ApiError> {
        let url = self.url(path);
        let value = self
            .send_json(|| {
                self.client
                    .post(&url)
                    .header(header::ACCEPT, "application/json")
                    .json(&body)
            })
            .await?;

        serde_json::from_value(value).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl AuthTransport for ApiClient {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        debug!(email = %request.email, "Sending login request");
        let body = serde_json::to_value(request)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        self.issue_credentials("auth/login", body).await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        debug!(email = %request.email, "Sending registration request");
        let body = serde_json::to_value(request)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        self.issue_credentials("auth/register", body).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ApiError> {
        debug!("Sending credential renewal request");
        self.issue_credentials("auth/refresh", json!({ "refreshToken": refresh_token }))
            .await
    }

    async fn logout(&self, access_token: &str) -> Result<(), ApiError> {
        let url = self.url("auth/logout");
        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn send(
        &self,
        access_token: &str,
        request: &ResourceRequest,
    ) -> Result<Value, ApiError> {
        let url = self.url(&request.path);
        self.send_json(|| {
            let mut builder = self
                .client
                .request(request.method.clone(), &url)
                .bearer_auth(access_token);
            if let Some(ref body) = request.body {
                builder = builder.json(body);
            }
            builder
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = ApiClient::new("https://api.taskdeck.io/").expect("client");
        assert_eq!(client.url("/auth/login"), "https://api.taskdeck.io/auth/login");
        assert_eq!(client.url("tasks"), "https://api.taskdeck.io/tasks");
    }

    #[test]
    fn test_resource_request_builder() {
        let req = ResourceRequest::new(Method::PATCH, "/users/me")
            .with_body(json!({ "displayName": "Ada" }));
        assert_eq!(req.method, Method::PATCH);
        assert_eq!(req.path, "/users/me");
        assert!(req.body.is_some());
    }
}
