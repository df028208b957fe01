use std::sync::Arc;
use std::time::Duration;

use dicomview_core::api::{ApiError, AuthSession, Credentials, RequestOptions, SignupRequest, UserInfo};
use dicomview_core::auth::{MemorySessionStore, SessionState};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn alice_response() -> Value {
    json!({
        "accessToken": "A1",
        "refreshToken": "R1",
        "tokenType": "Bearer",
        "expiresInSec": 3600,
        "username": "alice",
        "displayName": "Alice"
    })
}

fn alice_state() -> SessionState {
    SessionState {
        access_token: Some("A1".into()),
        refresh_token: Some("R1".into()),
        username: Some("alice".into()),
        display_name: Some("Alice".into()),
    }
}

fn client(server: &MockServer, store: &MemorySessionStore) -> AuthSession {
    AuthSession::new(server.uri(), store.clone()).expect("client builds")
}

async fn mount_refresh(server: &MockServer, response: ResponseTemplate, times: u64) {
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

fn refreshed_tokens() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"accessToken": "A2", "refreshToken": "R2"}))
}

async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .expect("request recording enabled")
        .len()
}

// ===== login / signup =====

#[tokio::test]
async fn login_overwrites_session_with_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"username": "alice", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(alice_response()))
        .expect(1)
        .mount(&server)
        .await;

    let stale = SessionState {
        access_token: Some("OLD".into()),
        refresh_token: None,
        username: Some("mallory".into()),
        display_name: None,
    };
    let store = MemorySessionStore::with_state(stale);
    let api = client(&server, &store);

    let auth = api
        .login(&Credentials::new("alice", "pw"))
        .await
        .expect("login succeeds");

    assert_eq!(auth.access_token, "A1");
    assert_eq!(auth.token_type, "Bearer");
    assert_eq!(api.session().snapshot(), alice_state());
    assert_eq!(store.persisted(), alice_state());
    assert!(api.is_authenticated());
    assert_eq!(
        api.user(),
        UserInfo {
            username: Some("alice".into()),
            display_name: Some("Alice".into()),
        }
    );
}

#[tokio::test]
async fn signup_without_email_stores_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/signup"))
        .and(body_json(json!({"username": "alice", "password": "pw", "displayName": "Alice"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(alice_response()))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemorySessionStore::new();
    let api = client(&server, &store);

    let request = SignupRequest {
        username: "alice".into(),
        password: "pw".into(),
        display_name: "Alice".into(),
        email: None,
    };
    api.signup(&request).await.expect("signup succeeds");

    assert_eq!(store.persisted(), alice_state());
}

#[tokio::test]
async fn login_rejection_reports_status_without_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, refreshed_tokens(), 0).await;

    let store = MemorySessionStore::with_state(alice_state());
    let api = client(&server, &store);

    let err = api
        .login(&Credentials::new("alice", "wrong"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Http { status, .. } if status == StatusCode::UNAUTHORIZED));
    assert_eq!(api.session().snapshot(), alice_state());
}

#[tokio::test]
async fn signup_conflict_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/signup"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let store = MemorySessionStore::new();
    let api = client(&server, &store);
    let request = SignupRequest {
        username: "alice".into(),
        password: "pw".into(),
        display_name: "Alice".into(),
        email: Some("alice@example.org".into()),
    };

    let err = api.signup(&request).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::CONFLICT));
    assert!(store.persisted().is_empty());
}

// ===== refresh =====

#[tokio::test]
async fn refresh_without_token_makes_no_call() {
    let server = MockServer::start().await;
    let store = MemorySessionStore::with_state(SessionState {
        access_token: Some("A1".into()),
        ..SessionState::default()
    });
    let api = client(&server, &store);

    assert!(!api.refresh_token().await);
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn refresh_rejected_leaves_session_unchanged() {
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(400), 1).await;

    let store = MemorySessionStore::with_state(alice_state());
    let api = client(&server, &store);

    assert!(!api.refresh_token().await);
    assert_eq!(api.session().snapshot(), alice_state());
    assert_eq!(store.persisted(), alice_state());
}

#[tokio::test]
async fn refresh_with_malformed_body_leaves_session_unchanged() {
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(200).set_body_string("not json"), 1).await;

    let store = MemorySessionStore::with_state(alice_state());
    let api = client(&server, &store);

    assert!(!api.refresh_token().await);
    assert_eq!(api.session().snapshot(), alice_state());
}

#[tokio::test]
async fn refresh_transport_failure_returns_false() {
    let store = MemorySessionStore::with_state(alice_state());
    // Nothing listens on port 1
    let api = AuthSession::new("http://127.0.0.1:1", store.clone()).expect("client builds");

    assert!(!api.refresh_token().await);
    assert_eq!(store.persisted(), alice_state());
}

#[tokio::test]
async fn refresh_success_replaces_only_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_json(json!({"refreshToken": "R1"})))
        .respond_with(refreshed_tokens())
        .expect(1)
        .mount(&server)
        .await;

    let store = MemorySessionStore::with_state(alice_state());
    let api = client(&server, &store);

    assert!(api.refresh_token().await);

    let expected = SessionState {
        access_token: Some("A2".into()),
        refresh_token: Some("R2".into()),
        username: Some("alice".into()),
        display_name: Some("Alice".into()),
    };
    assert_eq!(api.session().snapshot(), expected);
    assert_eq!(store.persisted(), expected);
}

// ===== request =====

#[tokio::test]
async fn request_sends_bearer_and_parses_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/studies/7"))
        .and(header("authorization", "Bearer A1"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"studyKey": 7})))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server, &MemorySessionStore::with_state(alice_state()));

    let body: Value = api.get("/api/studies/7").await.expect("request succeeds");
    assert_eq!(body, json!({"studyKey": 7}));
}

#[tokio::test]
async fn post_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/studies/search"))
        .and(header("authorization", "Bearer A1"))
        .and(body_json(json!({"patientName": "DOE"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server, &MemorySessionStore::with_state(alice_state()));

    let body: Vec<Value> = api
        .post("/api/studies/search", &json!({"patientName": "DOE"}))
        .await
        .expect("request succeeds");
    assert!(body.is_empty());
}

#[tokio::test]
async fn caller_authorization_header_wins() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/share/1"))
        .and(header("authorization", "Basic c2hhcmU="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server, &MemorySessionStore::with_state(alice_state()));
    let options = RequestOptions::get()
        .header(AUTHORIZATION, "Basic c2hhcmU=")
        .expect("valid header");

    let body: Value = api.request("/api/share/1", options).await.expect("request succeeds");
    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn unauthorized_then_refresh_then_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/studies"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, refreshed_tokens(), 1).await;
    Mock::given(method("GET"))
        .and(path("/api/studies"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"studyKey": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemorySessionStore::with_state(alice_state());
    let api = client(&server, &store);

    let body: Value = api.get("/api/studies").await.expect("retry succeeds");

    assert_eq!(body, json!([{"studyKey": 1}]));
    assert_eq!(request_count(&server).await, 3);
    assert_eq!(store.persisted().access_token.as_deref(), Some("A2"));
    assert_eq!(store.persisted().username.as_deref(), Some("alice"));
}

#[tokio::test]
async fn retry_failure_surfaces_status_without_second_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/studies"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, refreshed_tokens(), 1).await;
    Mock::given(method("GET"))
        .and(path("/api/studies"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemorySessionStore::with_state(alice_state());
    let api = client(&server, &store);

    let err = api.get::<Value>("/api/studies").await.unwrap_err();

    assert!(matches!(err, ApiError::Http { status, .. } if status == StatusCode::UNAUTHORIZED));
    // The refreshed session is kept; only a failed refresh logs out
    assert_eq!(store.persisted().access_token.as_deref(), Some("A2"));
}

#[tokio::test]
async fn failed_refresh_logs_out_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/studies"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, ResponseTemplate::new(401), 1).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .and(body_json(json!({"refreshToken": "R1"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemorySessionStore::with_state(alice_state());
    let api = client(&server, &store);

    let err = api.get::<Value>("/api/studies").await.unwrap_err();

    assert!(matches!(err, ApiError::AuthenticationFailed));
    assert!(api.session().snapshot().is_empty());
    assert!(store.persisted().is_empty());
    assert!(!api.is_authenticated());
}

#[tokio::test]
async fn unauthorized_without_refresh_token_fails_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/studies"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemorySessionStore::with_state(SessionState {
        access_token: Some("A1".into()),
        username: Some("alice".into()),
        ..SessionState::default()
    });
    let api = client(&server, &store);

    let err = api.get::<Value>("/api/studies").await.unwrap_err();

    assert!(matches!(err, ApiError::AuthenticationFailed));
    assert_eq!(request_count(&server).await, 1);
    assert!(store.persisted().is_empty());
}

#[tokio::test]
async fn other_failures_do_not_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/studies"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, refreshed_tokens(), 0).await;

    let store = MemorySessionStore::with_state(alice_state());
    let api = client(&server, &store);

    let err = api.get::<Value>("/api/studies").await.unwrap_err();

    match err {
        ApiError::Http { status, message } => {
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.persisted(), alice_state());
}

#[tokio::test]
async fn malformed_success_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/studies"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let api = client(&server, &MemorySessionStore::with_state(alice_state()));

    let err = api.get::<Value>("/api/studies").await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidResponse(_)));
}

#[tokio::test]
async fn concurrent_unauthorized_requests_refresh_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/studies"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    mount_refresh(&server, refreshed_tokens().set_delay(Duration::from_millis(100)), 1).await;
    Mock::given(method("GET"))
        .and(path("/api/studies"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(2)
        .mount(&server)
        .await;

    let api = Arc::new(client(&server, &MemorySessionStore::with_state(alice_state())));

    let (first, second) = tokio::join!(
        api.get::<Value>("/api/studies"),
        api.get::<Value>("/api/studies"),
    );

    assert_eq!(first.expect("first succeeds"), json!({"ok": true}));
    assert_eq!(second.expect("second succeeds"), json!({"ok": true}));
    assert_eq!(api.access_token().as_deref(), Some("A2"));
}

// ===== logout =====

#[tokio::test]
async fn logout_notifies_server_and_clears() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .and(header("authorization", "Bearer A1"))
        .and(body_json(json!({"refreshToken": "R1"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemorySessionStore::with_state(alice_state());
    let api = client(&server, &store);

    api.logout().await;

    assert!(store.persisted().is_empty());
    assert_eq!(api.user(), UserInfo::default());
}

#[tokio::test]
async fn logout_clears_when_notification_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, refreshed_tokens(), 0).await;

    let store = MemorySessionStore::with_state(alice_state());
    let api = client(&server, &store);

    api.logout().await;

    assert!(api.session().snapshot().is_empty());
    assert!(store.persisted().is_empty());
}

#[tokio::test]
async fn logout_clears_when_server_unreachable() {
    let store = MemorySessionStore::with_state(alice_state());
    let api = AuthSession::new("http://127.0.0.1:1", store.clone()).expect("client builds");

    api.logout().await;

    assert!(store.persisted().is_empty());
    assert!(!api.is_authenticated());
}

#[tokio::test]
async fn logout_during_refresh_stays_logged_out() {
    let server = MockServer::start().await;
    mount_refresh(&server, refreshed_tokens().set_delay(Duration::from_millis(300)), 1).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = MemorySessionStore::with_state(alice_state());
    let api = client(&server, &store);

    let (refreshed, ()) = tokio::join!(api.refresh_token(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        api.logout().await;
    });

    assert!(refreshed);
    assert!(!api.is_authenticated());
    assert!(api.session().snapshot().is_empty());
    assert!(store.persisted().is_empty());
}

#[tokio::test]
async fn logout_without_refresh_token_skips_notification() {
    let server = MockServer::start().await;
    let store = MemorySessionStore::with_state(SessionState {
        access_token: Some("A1".into()),
        ..SessionState::default()
    });
    let api = client(&server, &store);

    api.logout().await;

    assert_eq!(request_count(&server).await, 0);
    assert!(store.persisted().is_empty());
}
