//! Auth controller client.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use caselink_core::config::ApiConfig;
use caselink_core::error::AppError;
use caselink_core::result::AppResult;

use super::dto::{LoginRequest, TokenResponse, VerifyResponse};

/// Calls the session-related endpoints of the backend.
///
/// Any `Err` is treated by callers exactly like a negative answer.
#[async_trait]
pub trait AuthApi: Send + Sync + std::fmt::Debug + 'static {
    /// Check that `access_token` is still accepted.
    async fn verify(&self, access_token: &str) -> AppResult<VerifyResponse>;

    /// Exchange a refresh token for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> AppResult<TokenResponse>;

    /// Sign in with email and password.
    async fn login(&self, email: &str, password: &str) -> AppResult<TokenResponse>;
}

/// [`AuthApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    http: Client,
    config: ApiConfig,
}

impl HttpAuthApi {
    /// Creates a client with the configured request timeout.
    pub fn new(config: ApiConfig) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Creates a client sharing an existing connection pool.
    pub fn with_client(http: Client, config: ApiConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn verify(&self, access_token: &str) -> AppResult<VerifyResponse> {
        let url = self.config.auth_url("verify");
        debug!(url = %url, "Verifying access token");
        let resp = self.http.get(&url).bearer_auth(access_token).send().await?;
        read_json(resp, "verify").await
    }

    async fn refresh(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        let url = self.config.auth_url("refresh");
        debug!(url = %url, "Exchanging refresh token");
        let resp = self.http.post(&url).bearer_auth(refresh_token).send().await?;
        read_json(resp, "refresh").await
    }

    async fn login(&self, email: &str, password: &str) -> AppResult<TokenResponse> {
        let url = self.config.auth_url("login");
        debug!(url = %url, email, "Signing in");
        let resp = self
            .http
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        read_json(resp, "login").await
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response, action: &str) -> AppResult<T> {
    let status = resp.status();
    if !status.is_success() {
        return Err(AppError::network(format!("{action} returned HTTP {status}")));
    }
    resp.json::<T>().await.map_err(|e| {
        AppError::with_source(
            caselink_core::ErrorKind::Serialization,
            format!("{action} returned an unreadable body"),
            e,
        )
    })
}
