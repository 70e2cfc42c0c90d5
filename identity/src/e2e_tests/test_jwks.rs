//! Test the published key set.

use axum::http::{StatusCode, header};
use serde_json::Value;

use crate::e2e_tests::helpers::*;
use crate::keys::InMemoryKeyStore;
use crate::testing::{TestHarness, primary_key, secondary_key};

const PRIVATE_MEMBERS: [&str; 6] = ["d", "p", "q", "dp", "dq", "qi"];

fn key_ids(jwks: &Value) -> Vec<String> {
    jwks["keys"]
        .as_array()
        .expect("keys array")
        .iter()
        .map(|key| key["kid"].as_str().expect("kid").to_string())
        .collect()
}

fn assert_public_only(jwks: &Value) {
    for key in jwks["keys"].as_array().expect("keys array") {
        for member in PRIVATE_MEMBERS {
            assert!(key.get(member).is_none(), "JWKS leaked '{member}': {key}");
        }
        assert_eq!(key["kty"], "RSA");
        assert_eq!(key["use"], "sig");
        assert!(key["n"].is_string());
        assert!(key["e"].is_string());
    }
}

#[tokio::test]
async fn test_jwks_publishes_current_key() {
    let server = TestServer::new();

    let response = server.get("/.well-known/jwks.json", &Auth::None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        Some("application/json")
    );

    let jwks: Value = response.json();
    assert_public_only(&jwks);
    assert_eq!(key_ids(&jwks), vec![server.harness.keys.current_key_id()]);
    assert_eq!(jwks["keys"][0]["alg"], "RS256");
}

#[tokio::test]
async fn test_jwks_after_rotation_lists_both_keys() {
    let server = TestServer::new();
    let previous = server.harness.keys.current_key_id();

    server
        .harness
        .keys
        .rotate_to(secondary_key())
        .expect("rotate");

    let jwks: Value = server.get("/.well-known/jwks.json", &Auth::None).await.json();
    assert_public_only(&jwks);
    let kids = key_ids(&jwks);
    assert_eq!(kids.len(), 2);
    assert!(kids.contains(&previous));
    assert!(kids.contains(&server.harness.keys.current_key_id()));
}

#[tokio::test]
async fn test_tokens_signed_before_rotation_still_verify() {
    let server = TestServer::new();
    let (_, token) = server.harness.session_token().await;

    server
        .harness
        .keys
        .rotate_to(secondary_key())
        .expect("rotate");

    assert_eq!(
        server.get("/api/whoami", &Auth::Bearer(token)).await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_jwks_kid_matches_token_header() {
    let server = TestServer::from_harness(TestHarness::with_keys(
        InMemoryKeyStore::from_keys(vec![secondary_key(), primary_key()]).expect("keys"),
    ));
    let (_, token) = server.harness.session_token().await;
    let header = jsonwebtoken::decode_header(&token).expect("header");

    let jwks: Value = server.get("/.well-known/jwks.json", &Auth::None).await.json();
    let kid = header.kid.expect("kid");
    assert_eq!(kid, server.harness.keys.current_key_id());
    assert!(key_ids(&jwks).contains(&kid));
}
