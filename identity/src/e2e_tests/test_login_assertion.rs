//! Test that login only trusts verified upstream ID tokens.

use axum::http::StatusCode;
use serde_json::json;

use crate::assertion::Audience;
use crate::e2e_tests::helpers::*;
use crate::testing::{ASSERTION_TTL_SECS, primary_key, sign_assertion, upstream_key};

async fn registered(server: &TestServer) {
    let (_, auth) = server.admin().await;
    let code = server.invite(&auth, "alice@example.com").await;
    assert_eq!(
        server.register(&code, "alice-google", "abc").await.status,
        StatusCode::CREATED
    );
}

#[tokio::test]
async fn test_login_with_bare_subject_is_not_found() {
    let server = TestServer::new();
    registered(&server).await;

    server
        .post(
            "/login",
            &Auth::None,
            json!({
                "provider": "google",
                "subject_id": "alice-google",
                "nonce": "attacker-1",
            }),
        )
        .await
        .assert_opaque_not_found();
    server
        .post("/login", &Auth::None, json!({}))
        .await
        .assert_opaque_not_found();
    server.login_with("").await.assert_opaque_not_found();
    server.login_with("not-a-token").await.assert_opaque_not_found();
}

#[tokio::test]
async fn test_login_with_forged_assertion_is_not_found() {
    let server = TestServer::new();
    registered(&server).await;

    server
        .login_with(&server.harness.forged_assertion("alice-google", "n1"))
        .await
        .assert_opaque_not_found();

    // Signed by a key the upstream issuer never published.
    let claims = server.harness.id_token_claims("alice-google", "n2");
    server
        .login_with(&sign_assertion(&primary_key(), &claims))
        .await
        .assert_opaque_not_found();
}

#[tokio::test]
async fn test_login_with_expired_assertion_is_not_found() {
    let server = TestServer::new();
    registered(&server).await;

    let stale = server.harness.assertion("alice-google", "n1");
    server.harness.clock.advance((ASSERTION_TTL_SECS + 60) * 1000);
    server.login_with(&stale).await.assert_opaque_not_found();

    assert_eq!(
        server.login("alice-google", "n2").await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_login_with_wrong_issuer_or_audience_is_not_found() {
    let server = TestServer::new();
    registered(&server).await;

    let mut other_issuer = server.harness.id_token_claims("alice-google", "n1");
    other_issuer.iss = "https://evil.example.com".to_string();
    server
        .login_with(&sign_assertion(&upstream_key(), &other_issuer))
        .await
        .assert_opaque_not_found();

    let mut other_client = server.harness.id_token_claims("alice-google", "n2");
    other_client.aud = Audience::One("someone-elses-app".to_string());
    server
        .login_with(&sign_assertion(&upstream_key(), &other_client))
        .await
        .assert_opaque_not_found();
}

#[tokio::test]
async fn test_valid_assertion_logs_in() {
    let server = TestServer::new();
    registered(&server).await;

    let response = server.login("alice-google", "n1").await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
    assert!(response.set_cookie().is_some());
}
