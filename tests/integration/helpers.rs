//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use wiremock::MockServer;

use caselink_auth::{LoginRedirect, ManualClock, SessionStore};
use caselink_core::config::{ApiConfig, AppConfig, SessionConfig};
use caselink_core::error::AppError;
use caselink_core::result::AppResult;
use caselink_realtime::{HubConnector, HubLink, HubMessage, VersionProbe};
use caselink_store::MemoryStore;

/// A token long enough to be accepted.
pub const TOKEN: &str = "abcdefghij";

/// The admin user record used by most scenarios.
pub fn admin_user() -> Value {
    json!({"email": "a@b.com", "role": "Admin", "name": "Ada", "id": 7})
}

/// Session store over a fresh in-memory backend, with a manual clock.
pub fn session_store() -> (Arc<SessionStore>, Arc<MemoryStore>, Arc<ManualClock>) {
    let backend = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::default());
    let session = Arc::new(SessionStore::with_clock(
        backend.clone(),
        SessionConfig::default(),
        clock.clone(),
    ));
    (session, backend, clock)
}

/// API configuration pointing at a mock server.
pub fn api_config(server: &MockServer) -> ApiConfig {
    ApiConfig {
        base_url: server.uri(),
        ..ApiConfig::default()
    }
}

/// Full configuration pointing at a mock server.
pub fn app_config(server: &MockServer) -> AppConfig {
    AppConfig {
        api: api_config(server),
        ..AppConfig::default()
    }
}

/// Records every login redirect.
#[derive(Debug, Default)]
pub struct RecordingRedirect {
    pub reasons: Mutex<Vec<String>>,
}

impl RecordingRedirect {
    pub fn count(&self) -> usize {
        self.reasons.lock().unwrap().len()
    }
}

impl LoginRedirect for RecordingRedirect {
    fn redirect_to_login(&self, reason: &str) {
        self.reasons.lock().unwrap().push(reason.to_string());
    }
}

/// The hub's side of an accepted connection.
pub struct HubEnd {
    /// Invocations sent by the client.
    pub received: mpsc::Receiver<HubMessage>,
    /// Pushes invocations to the client.
    pub push: mpsc::Sender<HubMessage>,
}

/// Hub connector driven by a script of accepted (`true`) and refused
/// (`false`) attempts.
#[derive(Debug)]
pub struct ScriptedHub {
    script: Mutex<VecDeque<bool>>,
    accept_when_exhausted: bool,
    ends: mpsc::UnboundedSender<HubEnd>,
    /// Token passed to each attempt.
    pub tokens: Mutex<Vec<Option<String>>>,
}

impl ScriptedHub {
    pub fn new(script: Vec<bool>, accept_when_exhausted: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<HubEnd>) {
        let (ends, rx) = mpsc::unbounded_channel();
        let hub = Arc::new(Self {
            script: Mutex::new(script.into()),
            accept_when_exhausted,
            ends,
            tokens: Mutex::new(Vec::new()),
        });
        (hub, rx)
    }

    /// A hub that refuses every attempt.
    pub fn unreachable() -> Arc<Self> {
        Self::new(Vec::new(), false).0
    }

    pub fn attempts(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }
}

#[async_trait]
impl HubConnector for ScriptedHub {
    async fn connect(&self, access_token: Option<String>) -> AppResult<HubLink> {
        self.tokens.lock().unwrap().push(access_token);
        let accept = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.accept_when_exhausted);
        if !accept {
            return Err(AppError::connection("hub unavailable"));
        }

        let (outbound, received) = mpsc::channel(16);
        let (push, inbound) = mpsc::channel(16);
        let _ = self.ends.send(HubEnd { received, push });
        Ok(HubLink { outbound, inbound })
    }
}

/// Version source that replays a script, then fails.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    versions: Mutex<VecDeque<AppResult<String>>>,
    pub calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(versions: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            versions: Mutex::new(versions.iter().map(|v| Ok(v.to_string())).collect()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionProbe for ScriptedProbe {
    async fn fetch_version(&self) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.versions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::network("backend offline")))
    }
}
