//! Remote data-version lookup.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CACHE_CONTROL, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use caselink_auth::SessionStore;
use caselink_core::config::ApiConfig;
use caselink_core::error::{AppError, ErrorKind};
use caselink_core::result::AppResult;

/// Fetches the backend's current data version, an opaque comparable token.
#[async_trait]
pub trait VersionProbe: Send + Sync + std::fmt::Debug + 'static {
    /// Returns the current version.
    async fn fetch_version(&self) -> AppResult<String>;
}

#[derive(Debug, Deserialize)]
struct DataVersionResponse {
    #[serde(default)]
    version: Value,
}

/// Reads the version out of a `{"version": ...}` data-version body. Strings
/// are taken as-is; other JSON values by their JSON text.
pub fn version_from_body(body: Value) -> AppResult<String> {
    let body: DataVersionResponse = serde_json::from_value(body).map_err(|e| {
        AppError::with_source(
            ErrorKind::Serialization,
            "Data version response is unreadable",
            e,
        )
    })?;
    match body.version {
        Value::String(v) => Ok(v),
        Value::Null => Err(AppError::protocol("Data version response has no version")),
        other => Ok(other.to_string()),
    }
}

/// [`VersionProbe`] against `GET <base><data_version_path>`.
#[derive(Debug, Clone)]
pub struct HttpVersionProbe {
    http: Client,
    url: String,
    session: Arc<SessionStore>,
}

impl HttpVersionProbe {
    /// Creates a probe that authenticates with the current session.
    pub fn new(config: &ApiConfig, session: Arc<SessionStore>) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: config.url(&config.data_version_path),
            session,
        })
    }
}

#[async_trait]
impl VersionProbe for HttpVersionProbe {
    async fn fetch_version(&self) -> AppResult<String> {
        let resp = self
            .http
            .get(&self.url)
            .headers(self.session.auth_header())
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::network(format!(
                "Data version returned HTTP {status}"
            )));
        }

        let body: Value = resp.json().await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Serialization,
                "Data version response is unreadable",
                e,
            )
        })?;

        let version = version_from_body(body)?;
        debug!(version = %version, "Fetched data version");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caselink_core::config::SessionConfig;
    use caselink_store::MemoryStore;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn probe_for(server: &MockServer) -> HttpVersionProbe {
        let session = Arc::new(SessionStore::new(
            Arc::new(MemoryStore::new()),
            SessionConfig::default(),
        ));
        session
            .save("abcdefghij", &json!({"email": "a@b.com", "role": "Admin"}), None)
            .await;
        let config = ApiConfig {
            base_url: server.uri(),
            ..ApiConfig::default()
        };
        HttpVersionProbe::new(&config, session).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_sends_bearer_and_no_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/data-version"))
            .and(header("authorization", "Bearer abcdefghij"))
            .and(header("cache-control", "no-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "v17"})))
            .expect(1)
            .mount(&server)
            .await;

        let version = probe_for(&server).await.fetch_version().await.unwrap();
        assert_eq!(version, "v17");
    }

    #[tokio::test]
    async fn test_numeric_version_and_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/data-version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": 1712})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/data-version"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let probe = probe_for(&server).await;
        assert_eq!(probe.fetch_version().await.unwrap(), "1712");
        let err = probe.fetch_version().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
    }
}
