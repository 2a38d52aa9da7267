//! Session store: the authenticated session record and its persistence.
//!
//! The in-memory [`Session`] is the source of truth while the process
//! runs; every field is mirrored into the [`KeyValueStore`] so that a
//! restarted client can [`restore`](SessionStore::restore) it. Expiry is
//! lazy: nothing fires when the deadline passes, the next
//! [`is_authenticated`](SessionStore::is_authenticated) call notices and
//! clears the session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use caselink_core::config::SessionConfig;
use caselink_core::error::AppError;
use caselink_core::result::AppResult;
use caselink_core::traits::KeyValueStore;
use caselink_store::keys;

use super::clock::{Clock, SystemClock};
use super::model::{Session, SessionSignal, SessionUser};

/// Minimum accepted access-token length.
pub const MIN_TOKEN_LEN: usize = 10;

/// Owns the authenticated session record.
#[derive(Debug)]
pub struct SessionStore {
    /// Persistent backend.
    store: Arc<dyn KeyValueStore>,
    /// Session configuration.
    config: SessionConfig,
    /// Time source for expiry.
    clock: Arc<dyn Clock>,
    /// Current session, if any.
    current: RwLock<Option<Session>>,
    /// Save/clear notifications (drives the refresh timer).
    signal: watch::Sender<SessionSignal>,
    /// Save counter.
    generation: AtomicU64,
    /// Clear counter. A save started under an older epoch is dropped.
    epoch: AtomicU64,
    /// Serializes persisting saves against clears.
    updates: Mutex<()>,
}

impl SessionStore {
    /// Creates a session store over `store` using the system clock.
    pub fn new(store: Arc<dyn KeyValueStore>, config: SessionConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Creates a session store with an explicit clock.
    pub fn with_clock(
        store: Arc<dyn KeyValueStore>,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (signal, _) = watch::channel(SessionSignal::Cleared);
        Self {
            store,
            config,
            clock,
            current: RwLock::new(None),
            signal,
            generation: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            updates: Mutex::new(()),
        }
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Saves a new session. Returns `false`, leaving any prior session
    /// untouched, when the token, user or role is rejected or the store
    /// cannot be written.
    pub async fn save(&self, token: &str, user: &Value, refresh_token: Option<&str>) -> bool {
        match self.try_save(token, user, refresh_token).await {
            Ok(()) => true,
            Err(e) => {
                warn!(kind = %e.kind, error = %e.message, "Session not saved");
                false
            }
        }
    }

    /// Like [`save`](Self::save), reporting why a session was rejected.
    pub async fn try_save(
        &self,
        token: &str,
        user: &Value,
        refresh_token: Option<&str>,
    ) -> AppResult<()> {
        self.save_in_epoch(None, token, user, refresh_token).await
    }

    /// Saves only if no [`clear`](Self::clear) happened since `epoch` was
    /// read from [`clear_epoch`](Self::clear_epoch). A session cleared in
    /// the meantime stays cleared and the call fails with
    /// [`SessionExpired`](caselink_core::ErrorKind::SessionExpired).
    pub async fn try_save_if(
        &self,
        epoch: u64,
        token: &str,
        user: &Value,
        refresh_token: Option<&str>,
    ) -> AppResult<()> {
        self.save_in_epoch(Some(epoch), token, user, refresh_token)
            .await
    }

    /// Number of clears so far.
    pub fn clear_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    async fn save_in_epoch(
        &self,
        epoch: Option<u64>,
        token: &str,
        user: &Value,
        refresh_token: Option<&str>,
    ) -> AppResult<()> {
        if token.len() < MIN_TOKEN_LEN {
            return Err(AppError::invalid_credentials(format!(
                "Access token must be at least {MIN_TOKEN_LEN} characters"
            )));
        }

        let user = SessionUser::from_record(user)
            .ok_or_else(|| AppError::invalid_credentials("User record lacks email or role"))?;

        if !self.is_privileged(&user.role) {
            return Err(AppError::invalid_credentials(format!(
                "Role '{}' may not open an admin session",
                user.role
            )));
        }

        let expires_at = self
            .clock
            .now()
            .checked_add_signed(self.ttl()?)
            .ok_or_else(|| AppError::configuration("Session TTL overflows the clock"))?;

        let _updates = self.updates.lock().await;
        if epoch.is_some_and(|e| e != self.clear_epoch()) {
            return Err(AppError::session_expired(
                "Session was cleared before the save completed",
            ));
        }

        let session = Session {
            access_token: token.to_string(),
            refresh_token: refresh_token
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            role: user.role.clone(),
            user,
            expires_at,
        };

        self.persist(&session).await?;

        let user_email = session.user.email.clone();
        let expires_at = session.expires_at;
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(session);

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.signal.send_replace(SessionSignal::Saved { generation });

        info!(user = %user_email, expires_at = %expires_at, "Session saved");
        Ok(())
    }

    /// Wipes the persisted fields and the in-memory session and disarms the
    /// refresh timer. Store failures are logged; clearing never fails.
    pub async fn clear(&self) {
        let _updates = self.updates.lock().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);

        for key in keys::SESSION_KEYS {
            if let Err(e) = self.store.remove(key).await {
                warn!(key, error = %e, "Failed to remove session key");
            }
        }

        let had_session = self
            .current
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some();

        self.signal.send_replace(SessionSignal::Cleared);

        if had_session {
            info!("Session cleared");
        }
    }

    /// Whether a valid, unexpired admin session is present. An expired
    /// session is cleared as a side effect.
    pub async fn is_authenticated(&self) -> bool {
        let expired = {
            let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
            let Some(session) = guard.as_ref() else {
                return false;
            };

            if session.access_token.len() < MIN_TOKEN_LEN
                || !self.is_privileged(&session.role)
                || session.user.email.is_empty()
            {
                return false;
            }

            session.is_expired_at(self.clock.now())
        };

        if expired {
            debug!("Session expired, clearing");
            self.clear().await;
            return false;
        }

        true
    }

    /// Errors with [`SessionExpired`](caselink_core::ErrorKind::SessionExpired)
    /// unless [`is_authenticated`](Self::is_authenticated) holds.
    pub async fn require_authenticated(&self) -> AppResult<()> {
        if self.is_authenticated().await {
            Ok(())
        } else {
            Err(AppError::session_expired("No valid session, please log in again"))
        }
    }

    /// `Authorization: Bearer <token>` when a token is present, else empty.
    pub fn auth_header(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.access_token() {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(e) => warn!(error = %e, "Access token is not a valid header value"),
            }
        }
        headers
    }

    /// Current access token. Evaluated fresh on every call, so it serves as
    /// the token factory for hub connection attempts.
    pub fn access_token(&self) -> Option<String> {
        self.read(|s| s.access_token.clone())
    }

    /// Current refresh token.
    pub fn refresh_token(&self) -> Option<String> {
        self.read(|s| s.refresh_token.clone()).flatten()
    }

    /// Copy of the current session.
    pub fn snapshot(&self) -> Option<Session> {
        self.read(Session::clone)
    }

    /// Subscribe to save/clear notifications.
    pub fn subscribe(&self) -> watch::Receiver<SessionSignal> {
        self.signal.subscribe()
    }

    /// Loads a previously persisted session. Returns `true` when one was
    /// restored; incomplete or invalid records are cleared.
    pub async fn restore(&self) -> AppResult<bool> {
        let token = self.store.get(keys::ACCESS_TOKEN).await?;
        let role = self.store.get(keys::ROLE).await?;
        let user = self.store.get(keys::USER).await?;
        let refresh_token = self.store.get(keys::REFRESH_TOKEN).await?;
        let expires_at = self.store.get(keys::EXPIRES_AT).await?;

        let (Some(token), Some(role), Some(user), Some(expires_at)) = (token, role, user, expires_at)
        else {
            if !self.store.is_empty().await? {
                debug!("Incomplete persisted session, clearing");
                self.clear().await;
            }
            return Ok(false);
        };

        let user = serde_json::from_str::<Value>(&user)
            .ok()
            .and_then(|v| SessionUser::from_record(&v));
        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .ok()
            .map(|t| t.with_timezone(&Utc));

        let session = match (user, expires_at) {
            (Some(user), Some(expires_at))
                if token.len() >= MIN_TOKEN_LEN && self.is_privileged(&role) =>
            {
                Session {
                    access_token: token,
                    refresh_token: refresh_token.filter(|t| !t.is_empty()),
                    role,
                    user,
                    expires_at,
                }
            }
            _ => {
                warn!("Persisted session is invalid, clearing");
                self.clear().await;
                return Ok(false);
            }
        };

        if session.is_expired_at(self.clock.now()) {
            info!("Persisted session already expired, clearing");
            self.clear().await;
            return Ok(false);
        }

        info!(user = %session.user.email, "Session restored");
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(session);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.signal.send_replace(SessionSignal::Saved { generation });
        Ok(true)
    }

    fn is_privileged(&self, role: &str) -> bool {
        role.trim()
            .eq_ignore_ascii_case(self.config.privileged_role.trim())
    }

    fn ttl(&self) -> AppResult<Duration> {
        i64::try_from(self.config.session_ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                AppError::configuration(format!(
                    "session_ttl_seconds {} is out of range",
                    self.config.session_ttl_seconds
                ))
            })
    }

    fn read<T>(&self, f: impl FnOnce(&Session) -> T) -> Option<T> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(f)
    }

    async fn persist(&self, session: &Session) -> AppResult<()> {
        self.store.set(keys::ACCESS_TOKEN, &session.access_token).await?;
        self.store.set(keys::ROLE, &session.role).await?;
        self.store
            .set(keys::USER, &serde_json::to_string(&session.user)?)
            .await?;
        match &session.refresh_token {
            Some(token) => self.store.set(keys::REFRESH_TOKEN, token).await?,
            None => self.store.remove(keys::REFRESH_TOKEN).await?,
        }
        self.store
            .set(keys::EXPIRES_AT, &session.expires_at.to_rfc3339())
            .await?;
        Ok(())
    }
}
