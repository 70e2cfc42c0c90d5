//! Test invite expiry over HTTP.

use axum::http::StatusCode;
use serde_json::Value;

use crate::e2e_tests::helpers::*;

const INVITE_TTL_MS: u64 = 3600 * 1000;

#[tokio::test]
async fn test_expired_invite_is_not_found() {
    let server = TestServer::new();
    let (_, auth) = server.admin().await;
    let code = server.invite(&auth, "alice@example.com").await;

    server.harness.clock.advance(INVITE_TTL_MS + 1);
    server
        .register(&code, "alice-google", "abc")
        .await
        .assert_opaque_not_found();
}

#[tokio::test]
async fn test_invite_valid_until_expiry() {
    let server = TestServer::new();
    let (_, auth) = server.admin().await;
    let code = server.invite(&auth, "alice@example.com").await;

    server.harness.clock.advance(INVITE_TTL_MS);
    assert_eq!(
        server.register(&code, "alice-google", "abc").await.status,
        StatusCode::CREATED
    );
}

#[tokio::test]
async fn test_expired_invite_is_listed_as_expired() {
    let server = TestServer::new();
    let (admin, auth) = server.admin().await;
    server.invite(&auth, "alice@example.com").await;

    server.harness.clock.advance(INVITE_TTL_MS + 1);
    let token = server
        .harness
        .sessions
        .issue_session(admin.identity_id, admin.tenant_id, None)
        .expect("issue")
        .token;
    let listed: Vec<Value> = server.get("/invites", &Auth::Cookie(token)).await.json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["status"], "expired");
}
