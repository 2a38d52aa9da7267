//! Integration tests for single-flight refresh and the authenticated
//! request path, against a mock auth controller.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinSet;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use caselink_auth::{AuthenticatedRequestClient, HttpAuthApi, RefreshCoordinator, SessionStore};
use caselink_core::ErrorKind;

use helpers::{RecordingRedirect, TOKEN, admin_user};

async fn coordinator(server: &MockServer) -> (Arc<SessionStore>, Arc<RefreshCoordinator>) {
    let (session, _, _) = helpers::session_store();
    assert!(session.save(TOKEN, &admin_user(), Some("refresh-1")).await);
    let api = Arc::new(HttpAuthApi::new(helpers::api_config(server)).unwrap());
    let refresher = Arc::new(RefreshCoordinator::new(session.clone(), api));
    (session, refresher)
}

async fn mount_verify_rejected(server: &MockServer, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/api/Auth/verify"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"success": false, "message": "Unauthorized"}))
                .set_delay(Duration::from_millis(150)),
        )
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_refresh_ok(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/api/Auth/refresh"))
        .and(header("authorization", "Bearer refresh-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "success": true,
                    "token": "fresh-access-token",
                    "refreshToken": "refresh-2",
                    "user": {"email": "a@b.com", "role": "Admin"}
                }))
                .set_delay(Duration::from_millis(150)),
        )
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_is_single_flight() {
    let server = MockServer::start().await;
    mount_verify_rejected(&server, 1).await;
    mount_refresh_ok(&server, 1).await;
    let (session, refresher) = coordinator(&server).await;

    let mut callers = JoinSet::new();
    for _ in 0..8 {
        let refresher = refresher.clone();
        callers.spawn(async move { refresher.refresh().await });
    }

    let outcomes: Vec<bool> = callers.join_all().await;
    assert_eq!(outcomes.len(), 8);
    assert!(outcomes.iter().all(|ok| *ok));
    assert_eq!(refresher.refresh_count(), 1);
    assert!(!refresher.is_in_flight());

    assert_eq!(session.access_token().as_deref(), Some("fresh-access-token"));
    assert_eq!(session.refresh_token().as_deref(), Some("refresh-2"));
    server.verify().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failed_refresh_fails_everyone_once() {
    let server = MockServer::start().await;
    mount_verify_rejected(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/Auth/refresh"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;
    let (session, refresher) = coordinator(&server).await;

    let mut callers = JoinSet::new();
    for _ in 0..5 {
        let refresher = refresher.clone();
        callers.spawn(async move { refresher.refresh().await });
    }

    let outcomes = callers.join_all().await;
    assert_eq!(outcomes, vec![false; 5]);
    assert!(session.snapshot().is_none());
    server.verify().await;
}

#[tokio::test]
async fn test_verified_token_is_left_alone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/Auth/verify"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "user": {"email": "a@b.com", "role": "Admin"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh_ok(&server, 0).await;
    let (session, refresher) = coordinator(&server).await;
    let before = session.snapshot();

    assert!(refresher.refresh().await);
    assert_eq!(session.snapshot(), before);
}

#[tokio::test]
async fn test_sequential_refreshes_each_hit_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/Auth/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(2)
        .mount(&server)
        .await;
    let (_, refresher) = coordinator(&server).await;

    assert!(refresher.refresh().await);
    assert!(refresher.refresh().await);
    assert_eq!(refresher.refresh_count(), 2);
}

#[tokio::test]
async fn test_expired_request_redirects_to_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/runners"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/Auth/verify"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/Auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Refresh token revoked"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (session, refresher) = coordinator(&server).await;
    let redirect = Arc::new(RecordingRedirect::default());
    let client = AuthenticatedRequestClient::new(
        helpers::api_config(&server),
        session.clone(),
        refresher,
        redirect.clone(),
    )
    .unwrap();

    let err = client.get("/api/runners").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SessionExpired);
    assert_eq!(redirect.count(), 1);
    assert!(!session.is_authenticated().await);
}

#[tokio::test]
async fn test_refreshed_request_is_not_replayed_but_next_one_uses_new_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/admins"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/admins"))
        .and(header("authorization", "Bearer fresh-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;
    mount_verify_rejected(&server, 1).await;
    mount_refresh_ok(&server, 1).await;

    let (session, refresher) = coordinator(&server).await;
    let redirect = Arc::new(RecordingRedirect::default());
    let client = AuthenticatedRequestClient::new(
        helpers::api_config(&server),
        session,
        refresher,
        redirect.clone(),
    )
    .unwrap();

    let err = client.get("/api/admins").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthorized);
    assert_eq!(redirect.count(), 0);

    let admins: serde_json::Value = client.get_json("/api/admins").await.unwrap();
    assert_eq!(admins, json!([{"id": 1}]));
}
