//! Authentication gate behaviour over a running server

mod common;

use aad_webapp::security::generate_session_id;
use aad_webapp::{Account, AuthResult, IdentityContext, SESSION_COOKIE};
use chrono::{Duration, Utc};
use serde_json::json;
use wiremock::MockServer;

fn authenticated_context() -> IdentityContext {
    let claims = json!({
        "name": "Jane Doe",
        "iss": "https://login.microsoftonline.com/tid/v2.0",
        "iat": 1700000000,
        "aio": "opaque",
        "groups": ["g1", "g2"]
    });
    let result = AuthResult {
        account: Account {
            home_account_id: "oid.tid".to_string(),
            environment: "login.microsoftonline.com".to_string(),
            username: "jane@contoso.com".to_string(),
            tenant_id: "tid".to_string(),
        },
        id_token: common::unsigned_id_token(&claims),
        id_token_claims: claims.as_object().cloned().unwrap_or_default(),
        access_token: "access-token".to_string(),
        scopes: vec!["User.Read".to_string()],
        expires_on: Utc::now() + Duration::hours(1),
    };
    IdentityContext::default()
        .complete_login(result, "{}".to_string())
        .unwrap()
}

#[tokio::test]
async fn test_protected_path_without_session_gets_401_view() {
    let idp = MockServer::start().await;
    let base = common::spawn_app(common::test_state(&idp.uri())).await;

    let response = common::http_client()
        .get(format!("{}/auth_token_details", base))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
    // refused requests never create a session
    assert!(common::session_cookie(&response).is_none());
    let body = response.text().await.unwrap();
    assert!(body.contains("401: Unauthorized"));
}

#[tokio::test]
async fn test_protected_match_is_substring_containment() {
    let idp = MockServer::start().await;
    let base = common::spawn_app(common::test_state(&idp.uri())).await;
    let client = common::http_client();

    // no route exists for these, the gate still answers first
    for path in ["/auth/groups/extra", "/v2/auth_token_details_old"] {
        let response = client.get(format!("{}{}", base, path)).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 401, "path {}", path);
    }
}

#[tokio::test]
async fn test_unprotected_path_passes_without_session() {
    let idp = MockServer::start().await;
    let state = common::test_state(&idp.uri());
    let base = common::spawn_app(state.clone()).await;

    let response = common::http_client().get(format!("{}/", base)).send().await.unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert!(common::session_cookie(&response).is_none());
    assert!(response.text().await.unwrap().contains("/auth/sign_in"));
    assert_eq!(state.sessions.size(), 0);
}

#[tokio::test]
async fn test_anonymous_traffic_does_not_grow_session_store() {
    let idp = MockServer::start().await;
    let state = common::test_state(&idp.uri());
    let base = common::spawn_app(state.clone()).await;
    let client = common::http_client();

    for _ in 0..20 {
        let response = client.get(format!("{}/health", base)).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert!(common::session_cookie(&response).is_none());
    }
    assert_eq!(state.sessions.size(), 0);
}

#[tokio::test]
async fn test_sign_in_mints_session() {
    let idp = MockServer::start().await;
    let state = common::test_state(&idp.uri());
    let base = common::spawn_app(state.clone()).await;

    let response = common::http_client()
        .get(format!("{}/auth/sign_in", base))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 303);
    let cookie = common::session_cookie(&response).expect("session cookie");
    assert_eq!(common::session_id(&cookie).len(), 64);
    assert_eq!(state.sessions.size(), 1);
}

#[tokio::test]
async fn test_authenticated_session_reaches_handler() {
    let idp = MockServer::start().await;
    let state = common::test_state(&idp.uri());
    let session_id = generate_session_id();
    state.sessions.persist(&session_id, authenticated_context());
    let base = common::spawn_app(state.clone()).await;

    let response = common::http_client()
        .get(format!("{}/auth_token_details", base))
        .header("cookie", format!("{}={}", SESSION_COOKIE, session_id))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    // existing session, no new cookie
    assert!(common::session_cookie(&response).is_none());
    let body = response.text().await.unwrap();
    assert!(body.contains("<td>name</td><td>Jane Doe</td>"));
    assert!(body.contains("<td>iss</td>"));
    assert!(!body.contains("<td>iat</td>"));
    assert!(!body.contains("<td>aio</td>"));

    assert!(state.sessions.load(&session_id).is_authenticated());
}

#[tokio::test]
async fn test_malformed_session_cookie_is_replaced() {
    let idp = MockServer::start().await;
    let base = common::spawn_app(common::test_state(&idp.uri())).await;

    let response = common::http_client()
        .get(format!("{}/auth/sign_in", base))
        .header("cookie", format!("{}=not-hex", SESSION_COOKIE))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 303);
    let cookie = common::session_cookie(&response).expect("fresh session cookie");
    assert_ne!(common::session_id(&cookie), "not-hex");
}

#[tokio::test]
async fn test_health_is_public() {
    let idp = MockServer::start().await;
    let base = common::spawn_app(common::test_state(&idp.uri())).await;

    let response = common::http_client().get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}
