//! Test registration through an invite and use of the issued session.

use axum::http::StatusCode;
use cookie::SameSite;

use crate::e2e_tests::helpers::*;
use crate::routes::{SessionResponse, WhoAmI};
use crate::storage::IdentityRepository;
use crate::time::TimeSource;

#[tokio::test]
async fn test_register_sets_session_cookie() {
    let server = TestServer::new();
    let (admin, auth) = server.admin().await;
    let code = server.invite(&auth, "alice@example.com").await;

    let response = server.register(&code, "alice-google", "abc").await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());

    let cookie = response.set_cookie().expect("Set-Cookie");
    assert_eq!(cookie.name(), "moov");
    assert_eq!(cookie.path(), Some("/"));
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.secure(), Some(true));
    assert_eq!(cookie.same_site(), Some(SameSite::Strict));
    assert_eq!(cookie.max_age().map(|age| age.whole_seconds()), Some(3600));

    let body: SessionResponse = response.json();
    assert_eq!(body.tenant_id, admin.tenant_id);
    assert_eq!(body.expires_at, server.harness.clock.now_secs() + 3600);

    let identity = server
        .harness
        .store
        .get_identity(&body.tenant_id, &body.identity_id)
        .await
        .expect("identity stored");
    assert_eq!(identity.email, "alice@example.com");
}

#[tokio::test]
async fn test_whoami_with_cookie_and_bearer() {
    let server = TestServer::new();
    let (_, auth) = server.admin().await;
    let code = server.invite(&auth, "alice@example.com").await;
    let registered = server.register(&code, "alice-google", "abc").await;
    let token = registered.session_token();
    let session: SessionResponse = registered.json();

    let by_cookie = server.get("/whoami", &Auth::Cookie(token.clone())).await;
    assert_eq!(by_cookie.status, StatusCode::OK);
    let who: WhoAmI = by_cookie.json();
    assert_eq!(who.identity_id, session.identity_id);
    assert_eq!(who.credential_id, Some(session.credential_id));
    assert_eq!(who.first_name, "Alice");
    assert_eq!(who.last_name, "Liddell");
    assert_eq!(who.email, "alice@example.com");

    let by_bearer = server.get("/api/whoami", &Auth::Bearer(token.clone())).await;
    assert_eq!(by_bearer.status, StatusCode::OK);
    let who: WhoAmI = by_bearer.json();
    assert_eq!(who.identity_id, session.identity_id);

    // Each route only reads its own token source.
    server
        .get("/api/whoami", &Auth::Cookie(token.clone()))
        .await
        .assert_opaque_not_found();
    server
        .get("/whoami", &Auth::Bearer(token))
        .await
        .assert_opaque_not_found();
}

#[tokio::test]
async fn test_invite_code_is_single_use() {
    let server = TestServer::new();
    let (_, auth) = server.admin().await;
    let code = server.invite(&auth, "alice@example.com").await;

    assert_eq!(
        server.register(&code, "alice-google", "abc").await.status,
        StatusCode::CREATED
    );
    server
        .register(&code, "mallory-google", "xyz")
        .await
        .assert_opaque_not_found();
}

#[tokio::test]
async fn test_register_trims_code() {
    let server = TestServer::new();
    let (_, auth) = server.admin().await;
    let code = server.invite(&auth, "alice@example.com").await;

    let response = server
        .register(&format!("  {code}\n"), "alice-google", "abc")
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_register_without_valid_assertion_keeps_invite() {
    let server = TestServer::new();
    let (_, auth) = server.admin().await;
    let code = server.invite(&auth, "alice@example.com").await;

    server.register_with(&code, "").await.assert_opaque_not_found();
    server
        .register_with(&code, &server.harness.forged_assertion("alice-google", "abc"))
        .await
        .assert_opaque_not_found();
    server
        .post(
            "/register",
            &Auth::None,
            serde_json::json!({
                "code": code,
                "first_name": "Alice",
                "last_name": "Liddell",
                "provider": "google",
                "subject_id": "alice-google",
                "nonce": "abc",
            }),
        )
        .await
        .assert_opaque_not_found();

    assert_eq!(
        server.register(&code, "alice-google", "abc").await.status,
        StatusCode::CREATED
    );
}

#[tokio::test]
async fn test_register_with_unknown_code() {
    let server = TestServer::new();
    server
        .register("not-a-real-code", "alice-google", "abc")
        .await
        .assert_opaque_not_found();
}

#[tokio::test]
async fn test_register_missing_name_is_bad_request() {
    let server = TestServer::new();
    let (_, auth) = server.admin().await;
    let code = server.invite(&auth, "alice@example.com").await;

    let response = server
        .post(
            "/register",
            &Auth::None,
            serde_json::json!({
                "code": code,
                "first_name": "",
                "last_name": "Liddell",
                "assertion": server.harness.assertion("alice-google", "abc"),
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().expect("error").contains("first_name"));

    // The invite was not consumed.
    assert_eq!(
        server.register(&code, "alice-google", "abc").await.status,
        StatusCode::CREATED
    );
}
