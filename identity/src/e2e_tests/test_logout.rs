//! Test that logout clears the session cookie.

use axum::http::StatusCode;

use crate::e2e_tests::helpers::*;

#[tokio::test]
async fn test_logout_expires_cookie() {
    let server = TestServer::new();
    let (_, auth) = server.admin().await;

    let response = server.send(axum::http::Method::POST, "/logout", &auth, None).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let cookie = response.set_cookie().expect("Set-Cookie");
    assert_eq!(cookie.name(), "moov");
    assert_eq!(cookie.value(), "");
    assert_eq!(cookie.path(), Some("/"));
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.max_age().map(|age| age.whole_seconds()), Some(0));
}

#[tokio::test]
async fn test_logout_without_session() {
    let server = TestServer::new();

    let response = server.send(axum::http::Method::POST, "/logout", &Auth::None, None).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(response.set_cookie().is_some());
}
