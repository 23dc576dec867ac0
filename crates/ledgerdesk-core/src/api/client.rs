//! API client for the ERP backend.
//!
//! This module provides the `ApiClient` struct for the auth endpoints
//! (session check/refresh and login) and authenticated ledger queries, and
//! the [`AuthApi`] trait the session manager drives it through.

use std::sync::RwLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::record::deserialize_string_or_number;
use crate::auth::{AccountType, UserRecord};
use crate::ledger::{GlTransaction, GlTransactionsResponse};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Session check (GET) and login (POST) endpoint
const AUTH_PATH: &str = "/api/auth";

const GL_TRANSACTIONS_PATH: &str = "/api/gl/transactions";

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub user_name: String,
    pub password: String,
    pub user_type: &'static str,
}

impl LoginRequest {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            user_name: username.to_string(),
            password: password.to_string(),
            user_type: AccountType::from_username(username).code(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(deserialize_with = "deserialize_string_or_number")]
    compcode: String,
    #[serde(deserialize_with = "deserialize_string_or_number")]
    user_id: String,
    #[serde(default)]
    user_type: Option<String>,
    #[serde(default)]
    user_full_name: Option<String>,
    #[serde(default)]
    email_id: Option<String>,
    token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

impl From<LoginResponse> for UserRecord {
    fn from(resp: LoginResponse) -> Self {
        UserRecord {
            id: resp.user_id,
            company_code: resp.compcode,
            user_type: resp.user_type.unwrap_or_default(),
            full_name: resp.user_full_name.unwrap_or_default(),
            email: resp.email_id.unwrap_or_default(),
            token: resp.token,
            refresh_token: resp.refresh_token,
            ip: String::new(),
            browser: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthCheckResponse {
    #[serde(default)]
    pub token: Option<String>,
}

impl AuthCheckResponse {
    /// The renewed access token, if the backend issued one
    pub fn renewed_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Parse a JSON body the backend may leave empty or send as `null`.
fn parse_optional_body<T: DeserializeOwned>(body: &str) -> Result<Option<T>, ApiError> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

// ============================================================================
// Auth API seam
// ============================================================================

/// The backend calls the session manager depends on.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Validate a token pair, returning a renewed token when the session is
    /// still good
    async fn check_session(
        &self,
        token: &str,
        refresh_token: &str,
    ) -> Result<AuthCheckResponse, ApiError>;

    /// Exchange credentials for a user record. `Ok(None)` means the backend
    /// answered with an empty body.
    async fn login(&self, request: &LoginRequest) -> Result<Option<UserRecord>, ApiError>;

    /// Drop any cookies the backend has set
    fn clear_cookies(&self);
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// API client for the ERP backend.
pub struct ApiClient {
    client: RwLock<Client>,
    base_url: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Self::build_client(timeout).context("Failed to build HTTP client")?;
        Ok(Self {
            client: RwLock::new(client),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn build_client(timeout: Duration) -> reqwest::Result<Client> {
        Client::builder().timeout(timeout).cookie_store(true).build()
    }

    /// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
    fn http(&self) -> Client {
        self.client.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, token: &str) -> Result<T> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .http()
                .get(url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(ApiError::from)
                .with_context(|| format!("Failed to send GET request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse JSON response from {}", url));
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    /// Fetch the general-ledger transaction lines visible to the user
    pub async fn fetch_gl_transactions(&self, token: &str) -> Result<Vec<GlTransaction>> {
        let url = self.endpoint(GL_TRANSACTIONS_PATH);
        let response: GlTransactionsResponse = self.get(&url, token).await?;
        debug!(count = response.items.len(), "Fetched GL transactions");
        Ok(response.items)
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn check_session(
        &self,
        token: &str,
        refresh_token: &str,
    ) -> Result<AuthCheckResponse, ApiError> {
        let url = self.endpoint(AUTH_PATH);
        debug!(url = %url, timeout_ms = self.timeout.as_millis() as u64, "Checking session");

        let response = self
            .http()
            .get(&url)
            .query(&[("token", token), ("refreshToken", refresh_token)])
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        let body = response.text().await?;

        Ok(parse_optional_body(&body)?.unwrap_or_default())
    }

    async fn login(&self, request: &LoginRequest) -> Result<Option<UserRecord>, ApiError> {
        let url = self.endpoint(AUTH_PATH);
        debug!(url = %url, user_type = request.user_type, "Sending login request");

        let response = self.http().post(&url).json(request).send().await?;
        let response = Self::check_response(response).await?;
        let body = response.text().await?;

        let login: Option<LoginResponse> = parse_optional_body(&body)?;
        Ok(login.map(UserRecord::from))
    }

    fn clear_cookies(&self) {
        // reqwest's cookie store cannot be emptied in place, so start a
        // fresh client with a fresh store
        match Self::build_client(self.timeout) {
            Ok(client) => {
                *self.client.write().unwrap_or_else(|e| e.into_inner()) = client;
                debug!("Cleared HTTP cookies");
            }
            Err(e) => warn!(error = %e, "Failed to rebuild HTTP client; cookies kept"),
        }
    }
}
