//! Top-level sync engine that wires the session, refresh, hub, dispatch and
//! polling services together.

use std::sync::Arc;

use tracing::{info, warn};

use caselink_auth::{
    AuthApi, AuthenticatedRequestClient, HttpAuthApi, LogRedirect, LoginRedirect,
    RefreshCoordinator, Session, SessionStore,
};
use caselink_core::config::AppConfig;
use caselink_core::error::AppError;
use caselink_core::result::AppResult;
use caselink_core::traits::KeyValueStore;
use caselink_store::StoreManager;

use crate::connection::{BackoffPolicy, RealtimeConnectionManager, TokenFactory};
use crate::dispatch::EventDispatcher;
use crate::hub::{HubConnector, WebSocketConnector};
use crate::polling::{HttpVersionProbe, PollingFallback, VersionProbe};

/// External collaborators of the engine. Production uses HTTP and
/// WebSocket implementations; tests substitute their own.
#[derive(Debug, Clone)]
pub struct EngineParts {
    /// Auth controller client.
    pub auth: Arc<dyn AuthApi>,
    /// Hub transport.
    pub connector: Arc<dyn HubConnector>,
    /// Data-version source for polling.
    pub probe: Arc<dyn VersionProbe>,
    /// Where to send the user when the session is lost.
    pub redirect: Arc<dyn LoginRedirect>,
}

impl EngineParts {
    /// HTTP/WebSocket collaborators for `config`.
    pub fn http(config: &AppConfig, session: &Arc<SessionStore>) -> AppResult<Self> {
        Ok(Self {
            auth: Arc::new(HttpAuthApi::new(config.api.clone())?),
            connector: Arc::new(WebSocketConnector::new(config.realtime.clone())),
            probe: Arc::new(HttpVersionProbe::new(&config.api, session.clone())?),
            redirect: Arc::new(LogRedirect),
        })
    }
}

/// Owns every sync service for one process.
#[derive(Debug)]
pub struct SyncEngine {
    config: AppConfig,
    session: Arc<SessionStore>,
    auth: Arc<dyn AuthApi>,
    refresher: Arc<RefreshCoordinator>,
    requests: AuthenticatedRequestClient,
    dispatcher: EventDispatcher,
    polling: Arc<PollingFallback>,
    connection: RealtimeConnectionManager,
}

impl SyncEngine {
    /// Builds the engine with the store backend named in the config.
    pub fn from_config(config: AppConfig) -> AppResult<Self> {
        let store = StoreManager::new(&config.session.store)?;
        Self::new(config, store.shared())
    }

    /// Builds the engine over `store` with HTTP/WebSocket collaborators.
    pub fn new(config: AppConfig, store: Arc<dyn KeyValueStore>) -> AppResult<Self> {
        let session = Arc::new(SessionStore::new(store, config.session.clone()));
        let parts = EngineParts::http(&config, &session)?;
        Self::with_parts(config, session, parts)
    }

    /// Builds the engine from explicit collaborators.
    pub fn with_parts(
        config: AppConfig,
        session: Arc<SessionStore>,
        parts: EngineParts,
    ) -> AppResult<Self> {
        config.validate()?;

        let refresher = Arc::new(RefreshCoordinator::new(session.clone(), parts.auth.clone()));
        let requests = AuthenticatedRequestClient::new(
            config.api.clone(),
            session.clone(),
            refresher.clone(),
            parts.redirect,
        )?;

        let dispatcher = EventDispatcher::from_config(&config.realtime);
        let polling = Arc::new(PollingFallback::new(
            parts.probe,
            dispatcher.clone(),
            config.polling.interval(),
        ));

        let token_session = session.clone();
        let tokens: TokenFactory = Arc::new(move || token_session.access_token());
        let connection = RealtimeConnectionManager::new(
            parts.connector,
            tokens,
            dispatcher.clone(),
            polling.clone(),
            BackoffPolicy::from_config(&config.realtime),
        );

        Ok(Self {
            config,
            session,
            auth: parts.auth,
            refresher,
            requests,
            dispatcher,
            polling,
            connection,
        })
    }

    /// Restores the persisted session, starts the refresh timer, and
    /// connects to the hub. Without a session nothing is connected and
    /// `false` is returned.
    pub async fn init(&self) -> AppResult<bool> {
        let restored = self.session.restore().await?;
        self.refresher.init();

        if !self.session.is_authenticated().await {
            warn!(restored, "No valid session, realtime updates not started");
            return Ok(false);
        }

        self.connection.connect();
        info!("Sync engine started");
        Ok(true)
    }

    /// Signs in and saves the session.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<Session> {
        let resp = self.auth.login(email, password).await?;
        if !resp.success {
            return Err(AppError::invalid_credentials(
                resp.message
                    .unwrap_or_else(|| "Login rejected".to_string()),
            ));
        }

        let token = resp
            .token
            .ok_or_else(|| AppError::invalid_credentials("Login response carried no token"))?;
        let user = resp.user.unwrap_or_default();
        self.session
            .try_save(&token, &user, resp.refresh_token.as_deref())
            .await?;

        self.session
            .snapshot()
            .ok_or_else(|| AppError::internal("Session vanished after save"))
    }

    /// Clears the session and disconnects from the hub.
    pub async fn logout(&self) {
        self.connection.dispose().await;
        self.session.clear().await;
        info!("Logged out");
    }

    /// Tears everything down in reverse order of [`init`](Self::init).
    /// Pending debounced events are delivered first.
    pub async fn dispose(&self) {
        self.connection.dispose().await;
        self.polling.stop();
        self.dispatcher.flush();
        self.refresher.dispose();
        info!("Sync engine disposed");
    }

    /// Active configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Session store.
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Refresh coordinator.
    pub fn refresher(&self) -> &Arc<RefreshCoordinator> {
        &self.refresher
    }

    /// Authenticated HTTP client.
    pub fn requests(&self) -> &AuthenticatedRequestClient {
        &self.requests
    }

    /// Event dispatcher; register handlers here.
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Polling fallback.
    pub fn polling(&self) -> &Arc<PollingFallback> {
        &self.polling
    }

    /// Hub connection manager.
    pub fn connection(&self) -> &RealtimeConnectionManager {
        &self.connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use caselink_auth::api::dto::{TokenResponse, VerifyResponse};
    use caselink_core::ErrorKind;
    use caselink_store::MemoryStore;
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::connection::ConnectionState;
    use crate::hub::{HubLink, HubMessage};

    #[derive(Debug)]
    struct StubAuth;

    #[async_trait]
    impl AuthApi for StubAuth {
        async fn verify(&self, _token: &str) -> AppResult<VerifyResponse> {
            Ok(VerifyResponse {
                success: true,
                ..VerifyResponse::default()
            })
        }

        async fn refresh(&self, _refresh_token: &str) -> AppResult<TokenResponse> {
            Err(AppError::network("unused"))
        }

        async fn login(&self, email: &str, password: &str) -> AppResult<TokenResponse> {
            if password != "correct horse" {
                return Ok(TokenResponse {
                    success: false,
                    message: Some("Invalid email or password".into()),
                    ..TokenResponse::default()
                });
            }
            Ok(TokenResponse {
                success: true,
                token: Some("login-access-token".into()),
                refresh_token: Some("login-refresh".into()),
                user: Some(json!({"email": email, "role": "Admin", "name": "Ada"})),
                message: None,
            })
        }
    }

    /// Accepts every connect and keeps the server ends alive.
    #[derive(Debug, Default)]
    struct OpenHub {
        ends: std::sync::Mutex<Vec<(mpsc::Receiver<HubMessage>, mpsc::Sender<HubMessage>)>>,
    }

    #[async_trait]
    impl HubConnector for OpenHub {
        async fn connect(&self, _access_token: Option<String>) -> AppResult<HubLink> {
            let (outbound, received) = mpsc::channel(8);
            let (push, inbound) = mpsc::channel(8);
            self.ends.lock().unwrap().push((received, push));
            Ok(HubLink { outbound, inbound })
        }
    }

    #[derive(Debug)]
    struct FixedProbe;

    #[async_trait]
    impl VersionProbe for FixedProbe {
        async fn fetch_version(&self) -> AppResult<String> {
            Ok("v1".into())
        }
    }

    fn engine() -> SyncEngine {
        let config = AppConfig::default();
        let session = Arc::new(SessionStore::new(
            Arc::new(MemoryStore::new()),
            config.session.clone(),
        ));
        let parts = EngineParts {
            auth: Arc::new(StubAuth),
            connector: Arc::new(OpenHub::default()),
            probe: Arc::new(FixedProbe),
            redirect: Arc::new(LogRedirect),
        };
        SyncEngine::with_parts(config, session, parts).unwrap()
    }

    #[tokio::test]
    async fn test_init_without_session_stays_disconnected() {
        let engine = engine();
        assert!(!engine.init().await.unwrap());
        assert_eq!(engine.connection().state(), ConnectionState::Disconnected);
        engine.dispose().await;
    }

    #[tokio::test]
    async fn test_login_then_init_connects() {
        let engine = engine();
        let session = engine.login("a@b.com", "correct horse").await.unwrap();
        assert_eq!(session.user.name.as_deref(), Some("Ada"));
        assert_eq!(session.refresh_token.as_deref(), Some("login-refresh"));

        assert!(engine.init().await.unwrap());
        let mut states = engine.connection().subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            states.wait_for(|s| *s == ConnectionState::Connected),
        )
        .await
        .unwrap()
        .unwrap();

        engine.logout().await;
        assert!(!engine.session().is_authenticated().await);
        assert_eq!(engine.connection().state(), ConnectionState::Disconnected);
        engine.dispose().await;
    }

    #[tokio::test]
    async fn test_rejected_login() {
        let engine = engine();
        let err = engine.login("a@b.com", "wrong").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidCredentials);
        assert!(err.message.contains("Invalid email or password"));
        assert!(engine.session().snapshot().is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.realtime.max_outer_retries = 0;
        let session = Arc::new(SessionStore::new(
            Arc::new(MemoryStore::new()),
            config.session.clone(),
        ));
        let parts = EngineParts {
            auth: Arc::new(StubAuth),
            connector: Arc::new(OpenHub::default()),
            probe: Arc::new(FixedProbe),
            redirect: Arc::new(LogRedirect),
        };
        let err = SyncEngine::with_parts(config, session, parts).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }
}
