//! Integration tests for the session store lifecycle.

mod helpers;

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;

use caselink_auth::SessionStore;
use caselink_core::config::{SessionConfig, StoreConfig};
use caselink_core::traits::KeyValueStore;
use caselink_store::StoreManager;

use helpers::{TOKEN, admin_user};

#[tokio::test]
async fn test_rejected_saves_leave_prior_session_untouched() {
    let (session, backend, _) = helpers::session_store();
    assert!(session.save(TOKEN, &admin_user(), Some("refresh-1")).await);
    let before = session.snapshot();
    let stored_before = backend.keys().await.unwrap().len();

    let rejected = [
        ("short", admin_user()),
        ("", admin_user()),
        ("123456789", admin_user()),
        ("0123456789abc", json!({"role": "Admin"})),
        ("0123456789abc", json!({"email": "a@b.com"})),
        ("0123456789abc", json!({"email": "", "role": "Admin"})),
        ("0123456789abc", json!({"email": "a@b.com", "role": "Viewer"})),
        ("0123456789abc", json!({"email": "a@b.com", "role": "Administrator"})),
        ("0123456789abc", json!("not an object")),
    ];

    for (token, user) in rejected {
        assert!(
            !session.save(token, &user, None).await,
            "save accepted token={token:?} user={user}"
        );
        assert_eq!(session.snapshot(), before);
    }

    assert!(session.is_authenticated().await);
    assert_eq!(backend.keys().await.unwrap().len(), stored_before);
}

#[tokio::test]
async fn test_role_match_ignores_case() {
    let (session, _, _) = helpers::session_store();
    assert!(
        session
            .save(TOKEN, &json!({"email": "a@b.com", "role": "aDmIn"}), None)
            .await
    );
    assert!(session.is_authenticated().await);
}

#[tokio::test]
async fn test_save_then_lazy_expiry_clears_store() {
    let (session, backend, clock) = helpers::session_store();

    assert!(session.save(TOKEN, &admin_user(), None).await);
    assert!(session.is_authenticated().await);
    assert!(!backend.is_empty().await.unwrap());

    // Nothing happens when the deadline passes unobserved.
    clock.advance(Duration::hours(2));
    assert!(session.snapshot().is_some());

    assert!(!session.is_authenticated().await);
    assert!(backend.is_empty().await.unwrap());
    assert!(session.snapshot().is_none());
    assert!(session.auth_header().is_empty());
}

#[tokio::test]
async fn test_expiry_is_one_hour_from_save() {
    let (session, _, clock) = helpers::session_store();
    assert!(session.save(TOKEN, &admin_user(), None).await);

    clock.advance(Duration::minutes(59));
    assert!(session.is_authenticated().await);

    clock.advance(Duration::minutes(1));
    assert!(!session.is_authenticated().await);
}

#[tokio::test]
async fn test_auth_header_follows_session() {
    let (session, _, _) = helpers::session_store();
    assert!(session.auth_header().is_empty());

    assert!(session.save(TOKEN, &admin_user(), None).await);
    let headers = session.auth_header();
    assert_eq!(
        headers.get("authorization").unwrap().to_str().unwrap(),
        format!("Bearer {TOKEN}")
    );

    session.clear().await;
    assert!(session.auth_header().is_empty());
}

#[tokio::test]
async fn test_file_store_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store_config = StoreConfig {
        backend: "file".to_string(),
        path: dir.path().join("session.json").to_string_lossy().into_owned(),
    };

    {
        let store = StoreManager::new(&store_config).unwrap();
        let session = SessionStore::new(store.shared(), SessionConfig::default());
        assert!(session.save(TOKEN, &admin_user(), Some("refresh-1")).await);
    }

    let store = StoreManager::new(&store_config).unwrap();
    let session = Arc::new(SessionStore::new(store.shared(), SessionConfig::default()));
    assert!(session.restore().await.unwrap());
    assert!(session.is_authenticated().await);

    let restored = session.snapshot().unwrap();
    assert_eq!(restored.user.email, "a@b.com");
    assert_eq!(restored.user.name.as_deref(), Some("Ada"));
    assert_eq!(restored.user.id, Some(json!(7)));
    assert_eq!(restored.refresh_token.as_deref(), Some("refresh-1"));

    session.clear().await;
    let store = StoreManager::new(&store_config).unwrap();
    let session = SessionStore::new(store.shared(), SessionConfig::default());
    assert!(!session.restore().await.unwrap());
}
