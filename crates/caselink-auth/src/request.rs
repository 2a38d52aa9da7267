//! Bearer-authenticated requests against the admin API.
//!
//! On an authorization failure the session is refreshed through the
//! [`RefreshCoordinator`]. The failed request is never replayed here;
//! callers decide whether to retry.

use std::sync::Arc;

use reqwest::{Client, Method, StatusCode, header::HeaderMap};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use caselink_core::config::ApiConfig;
use caselink_core::error::AppError;
use caselink_core::result::AppResult;

use crate::session::{RefreshCoordinator, SessionStore};

/// Body markers the backend uses for an auth failure on non-401 statuses.
const AUTH_FAILURE_MARKERS: [&str; 3] = ["unauthorized", "token expired", "invalid token"];

/// Sends the user back to a login surface after unrecoverable session loss.
pub trait LoginRedirect: Send + Sync + std::fmt::Debug + 'static {
    /// Called once per lost session, after it has been cleared.
    fn redirect_to_login(&self, reason: &str);
}

/// Redirect that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRedirect;

impl LoginRedirect for LogRedirect {
    fn redirect_to_login(&self, reason: &str) {
        warn!(reason, "Session expired, login required");
    }
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> AppResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as lossy UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn is_auth_failure(&self) -> bool {
        if self.status == StatusCode::UNAUTHORIZED {
            return true;
        }
        if self.status.is_success() {
            return false;
        }
        let text = self.text().to_ascii_lowercase();
        AUTH_FAILURE_MARKERS.iter().any(|m| text.contains(m))
    }
}

/// HTTP client that attaches the session's bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedRequestClient {
    http: Client,
    config: ApiConfig,
    session: Arc<SessionStore>,
    refresher: Arc<RefreshCoordinator>,
    redirect: Arc<dyn LoginRedirect>,
}

impl AuthenticatedRequestClient {
    /// Creates a client with the configured request timeout.
    pub fn new(
        config: ApiConfig,
        session: Arc<SessionStore>,
        refresher: Arc<RefreshCoordinator>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            config,
            session,
            refresher,
            redirect,
        })
    }

    /// Issues a request with the bearer header merged in.
    ///
    /// `path` is joined onto the API base URL unless it is absolute.
    /// Returns the response for any 2xx status. An authorization failure
    /// triggers one refresh: if it fails the session is gone and
    /// [`SessionExpired`](caselink_core::ErrorKind::SessionExpired) is
    /// returned; if it succeeds [`Unauthorized`](caselink_core::ErrorKind::Unauthorized)
    /// is returned and the caller may retry.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> AppResult<ApiResponse> {
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            self.config.url(path)
        };

        let mut builder = self
            .http
            .request(method.clone(), &url)
            .headers(self.session.auth_header());
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| {
            AppError::with_source(
                caselink_core::ErrorKind::Network,
                format!("{method} {path} failed"),
                e,
            )
        })?;

        let response = ApiResponse {
            status: resp.status(),
            headers: resp.headers().clone(),
            body: resp.bytes().await?.to_vec(),
        };
        debug!(%method, path, status = %response.status, "API request finished");

        if response.is_auth_failure() {
            return Err(self.handle_auth_failure(&method, path).await);
        }

        if !response.status.is_success() {
            return Err(AppError::network(format!(
                "{method} {path} returned HTTP {}",
                response.status
            )));
        }

        Ok(response)
    }

    /// `GET` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        self.request(Method::GET, path, None).await?.json()
    }

    /// `GET` request.
    pub async fn get(&self, path: &str) -> AppResult<ApiResponse> {
        self.request(Method::GET, path, None).await
    }

    /// `POST` request with a JSON body.
    pub async fn post(&self, path: &str, body: &Value) -> AppResult<ApiResponse> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// `PUT` request with a JSON body.
    pub async fn put(&self, path: &str, body: &Value) -> AppResult<ApiResponse> {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// `DELETE` request.
    pub async fn delete(&self, path: &str) -> AppResult<ApiResponse> {
        self.request(Method::DELETE, path, None).await
    }

    async fn handle_auth_failure(&self, method: &Method, path: &str) -> AppError {
        warn!(%method, path, "Request unauthorized, refreshing session");
        if self.refresher.refresh().await {
            AppError::unauthorized(format!(
                "{method} {path} was rejected; the session has been refreshed, retry the request"
            ))
        } else {
            self.redirect.redirect_to_login("Session expired");
            AppError::session_expired("Session expired, please log in again")
        }
    }
}
