//! Test invite management over HTTP.

use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::e2e_tests::helpers::*;

#[tokio::test]
async fn test_send_invite_never_returns_code() {
    let server = TestServer::new();
    let (admin, auth) = server.admin().await;

    let response = server
        .post("/invites", &auth, json!({ "email": "alice@example.com" }))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let code = server.harness.notifier.last_invite_code().expect("code");
    assert!(!response.text().contains(&code));

    let invite: Value = response.json();
    assert_eq!(invite["email"], "alice@example.com");
    assert_eq!(invite["tenant_id"], admin.tenant_id.to_string());
    assert_eq!(invite["invited_by"], admin.identity_id.to_string());
    assert!(invite.get("code").is_none());
    assert!(invite.get("code_hash").is_none());

    let sent = server.harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "alice@example.com");
    assert!(
        sent[0]
            .invite_url()
            .expect("url")
            .starts_with("https://identity.test/register?code=")
    );
}

#[tokio::test]
async fn test_list_and_disable() {
    let server = TestServer::new();
    let (_, auth) = server.admin().await;
    let code = server.invite(&auth, "alice@example.com").await;
    server.invite(&auth, "bob@example.com").await;

    let listed: Vec<Value> = server.get("/invites", &auth).await.json();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|invite| invite["status"] == "pending"));
    assert!(listed.iter().all(|invite| invite.get("code_hash").is_none()));

    let alice = listed
        .iter()
        .find(|invite| invite["email"] == "alice@example.com")
        .expect("alice's invite");
    let invite_id = alice["invite_id"].as_str().expect("invite_id");

    let response = server
        .delete(&format!("/invites/{invite_id}"), &auth)
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let listed: Vec<Value> = server.get("/invites", &auth).await.json();
    let alice = listed
        .iter()
        .find(|invite| invite["invite_id"] == invite_id)
        .expect("alice's invite");
    assert_eq!(alice["status"], "disabled");
    assert!(alice["disabled_by"].is_string());

    server
        .register(&code, "alice-google", "abc")
        .await
        .assert_opaque_not_found();
}

#[tokio::test]
async fn test_redeemed_invite_shows_redeemed() {
    let server = TestServer::new();
    let (_, auth) = server.admin().await;
    let code = server.invite(&auth, "alice@example.com").await;
    server.register(&code, "alice-google", "abc").await;

    let listed: Vec<Value> = server.get("/invites", &auth).await.json();
    assert_eq!(listed[0]["status"], "redeemed");
    assert!(listed[0]["redeemed_on"].is_u64());
}

#[tokio::test]
async fn test_invites_are_tenant_scoped() {
    let server = TestServer::new();
    let (_, acme) = server.admin().await;
    let (_, globex) = server.admin().await;
    server.invite(&acme, "alice@example.com").await;

    let listed: Vec<Value> = server.get("/invites", &acme).await.json();
    let invite_id = listed[0]["invite_id"].as_str().expect("invite_id").to_string();

    let listed: Vec<Value> = server.get("/invites", &globex).await.json();
    assert!(listed.is_empty());

    server
        .delete(&format!("/invites/{invite_id}"), &globex)
        .await
        .assert_opaque_not_found();
}

#[tokio::test]
async fn test_invalid_email_is_bad_request() {
    let server = TestServer::new();
    let (_, auth) = server.admin().await;

    let response = server
        .post("/invites", &auth, json!({ "email": "not-an-email" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].is_string());
    assert!(server.harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_registered_user_can_invite_into_same_tenant() {
    let server = TestServer::new();
    let (admin, auth) = server.admin().await;
    let code = server.invite(&auth, "alice@example.com").await;
    let alice = Auth::Cookie(
        server
            .register(&code, "alice-google", "abc")
            .await
            .session_token(),
    );

    server.invite(&alice, "carol@example.com").await;
    let listed: Vec<Value> = server.get("/invites", &alice).await.json();
    assert_eq!(listed.len(), 2);
    assert!(
        listed
            .iter()
            .all(|invite| invite["tenant_id"] == admin.tenant_id.to_string())
    );
}
