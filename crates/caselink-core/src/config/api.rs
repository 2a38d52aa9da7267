//! REST API endpoint configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the admin REST API lives and how long calls may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the backend, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path prefix of the auth controller (`verify`, `refresh`, `login`).
    #[serde(default = "default_auth_path")]
    pub auth_path: String,
    /// Path of the lightweight data-version endpoint.
    #[serde(default = "default_data_version_path")]
    pub data_version_path: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_path: default_auth_path(),
            data_version_path: default_data_version_path(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl ApiConfig {
    /// Joins `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// URL of an auth controller action (e.g. `"verify"`).
    pub fn auth_url(&self, action: &str) -> String {
        let prefix = self.auth_path.trim_end_matches('/');
        self.url(&format!("{prefix}/{action}"))
    }
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_auth_path() -> String {
    "/api/Auth".to_string()
}

fn default_data_version_path() -> String {
    "/api/data-version".to_string()
}

fn default_request_timeout() -> u64 {
    30
}
