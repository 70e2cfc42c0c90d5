//! Test that every authentication failure is an opaque 404.

use axum::http::StatusCode;
use serde_json::json;

use crate::e2e_tests::helpers::*;
use crate::ids::{IdentityId, InviteId, TenantId};
use crate::keys::InMemoryKeyStore;
use crate::testing::{TestHarness, secondary_key};

const PROTECTED: [&str; 2] = ["/whoami", "/invites"];

#[tokio::test]
async fn test_missing_token() {
    let server = TestServer::new();

    for uri in PROTECTED {
        server.get(uri, &Auth::None).await.assert_opaque_not_found();
    }
    server
        .get("/api/whoami", &Auth::None)
        .await
        .assert_opaque_not_found();
    server
        .post("/invites", &Auth::None, json!({ "email": "alice@example.com" }))
        .await
        .assert_opaque_not_found();
    server
        .delete(&format!("/invites/{}", InviteId::new()), &Auth::None)
        .await
        .assert_opaque_not_found();

    assert!(server.harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_garbage_tokens() {
    let server = TestServer::new();

    for token in ["", "garbage", "a.b.c", "eyJhbGciOiJub25lIn0.e30."] {
        for uri in PROTECTED {
            server
                .get(uri, &Auth::Cookie(token.to_string()))
                .await
                .assert_opaque_not_found();
        }
        server
            .get("/api/whoami", &Auth::Bearer(token.to_string()))
            .await
            .assert_opaque_not_found();
    }
}

#[tokio::test]
async fn test_token_from_unknown_key() {
    let server = TestServer::new();
    let other = TestHarness::with_keys(
        InMemoryKeyStore::from_keys(vec![secondary_key()]).expect("keys"),
    );
    let (_, token) = other.session_token().await;

    server
        .get("/whoami", &Auth::Cookie(token.clone()))
        .await
        .assert_opaque_not_found();
    server
        .get("/api/whoami", &Auth::Bearer(token))
        .await
        .assert_opaque_not_found();
}

#[tokio::test]
async fn test_tampered_token() {
    let server = TestServer::new();
    let (_, token) = server.harness.session_token().await;

    // Swap in a payload for someone else, keeping the original signature.
    let (_, foreign) = TestServer::new().harness.session_token().await;
    let foreign_payload = foreign.split('.').nth(1).expect("payload");
    let parts: Vec<&str> = token.split('.').collect();
    let tampered = format!("{}.{foreign_payload}.{}", parts[0], parts[2]);

    server
        .get("/whoami", &Auth::Cookie(tampered))
        .await
        .assert_opaque_not_found();
}

#[tokio::test]
async fn test_expired_token() {
    let server = TestServer::new();
    let (_, token) = server.harness.session_token().await;

    assert_eq!(
        server.get("/whoami", &Auth::Cookie(token.clone())).await.status,
        StatusCode::OK
    );

    server.harness.clock.advance(3600 * 1000 + 1000);
    server
        .get("/whoami", &Auth::Cookie(token))
        .await
        .assert_opaque_not_found();
}

#[tokio::test]
async fn test_token_for_missing_identity() {
    let server = TestServer::new();
    let token = server
        .harness
        .sessions
        .issue_session(IdentityId::new(), TenantId::new(), None)
        .expect("issue")
        .token;

    server
        .get("/whoami", &Auth::Cookie(token))
        .await
        .assert_opaque_not_found();
}
