//! Test login with nonce replay protection.

use axum::http::StatusCode;

use crate::e2e_tests::helpers::*;
use crate::routes::{SessionResponse, WhoAmI};

async fn registered(server: &TestServer) -> SessionResponse {
    let (_, auth) = server.admin().await;
    let code = server.invite(&auth, "alice@example.com").await;
    let response = server.register(&code, "alice-google", "abc").await;
    assert_eq!(response.status, StatusCode::CREATED);
    response.json()
}

#[tokio::test]
async fn test_login_nonce_sequence() {
    let server = TestServer::new();
    let alice = registered(&server).await;

    // "abc" was spent at registration.
    server.login("alice-google", "abc").await.assert_opaque_not_found();

    let response = server.login("alice-google", "def").await;
    assert_eq!(response.status, StatusCode::OK);
    let body: SessionResponse = response.json();
    assert_eq!(body.identity_id, alice.identity_id);
    assert_eq!(body.credential_id, alice.credential_id);

    let who: WhoAmI = server
        .get("/whoami", &Auth::Cookie(response.session_token()))
        .await
        .json();
    assert_eq!(who.email, "alice@example.com");

    server.login("alice-google", "def").await.assert_opaque_not_found();
    assert_eq!(
        server.login("alice-google", "ghi").await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_login_unknown_credential() {
    let server = TestServer::new();
    registered(&server).await;

    server.login("bob-google", "abc").await.assert_opaque_not_found();
}

#[tokio::test]
async fn test_login_blank_nonce_is_not_found() {
    let server = TestServer::new();
    registered(&server).await;

    server.login("alice-google", "  ").await.assert_opaque_not_found();
}

#[tokio::test]
async fn test_same_assertion_cannot_be_presented_twice() {
    let server = TestServer::new();
    registered(&server).await;

    let assertion = server.harness.assertion("alice-google", "once");
    assert_eq!(server.login_with(&assertion).await.status, StatusCode::OK);
    server.login_with(&assertion).await.assert_opaque_not_found();
}

#[tokio::test]
async fn test_each_login_issues_a_distinct_token() {
    let server = TestServer::new();
    registered(&server).await;

    let first = server.login("alice-google", "n1").await.session_token();
    let second = server.login("alice-google", "n2").await.session_token();
    assert_ne!(first, second);
}
