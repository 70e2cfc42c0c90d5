//! Common helpers for end-to-end tests.

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use cookie::Cookie;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::routes::create_router;
use crate::storage::Identity;
use crate::testing::TestHarness;

/// How a request authenticates.
#[derive(Debug, Clone)]
pub enum Auth {
    None,
    /// Sent as the `moov` session cookie.
    Cookie(String),
    /// Sent as `Authorization: Bearer <token>`.
    Bearer(String),
}

/// A buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    /// Deserialize the body.
    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Response body should be JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).expect("Response body should be UTF-8")
    }

    /// The cookie set by this response, if any.
    pub fn set_cookie(&self) -> Option<Cookie<'static>> {
        self.headers
            .get(header::SET_COOKIE)
            .map(|value| {
                let value = value.to_str().expect("Set-Cookie should be ASCII");
                Cookie::parse(value.to_string()).expect("Set-Cookie should parse")
            })
    }

    /// The session token carried by `Set-Cookie`.
    pub fn session_token(&self) -> String {
        self.set_cookie()
            .expect("Response should set the session cookie")
            .value()
            .to_string()
    }

    /// Assert this is the bare 404 every auth failure produces.
    pub fn assert_opaque_not_found(&self) {
        assert_eq!(self.status, StatusCode::NOT_FOUND);
        assert!(self.body.is_empty(), "404 body should be empty: {}", self.text());
        assert!(self.headers.get(header::SET_COOKIE).is_none());
    }
}

/// The router over a fresh [`TestHarness`].
pub struct TestServer {
    pub harness: TestHarness,
    router: Router,
}

impl TestServer {
    #[must_use]
    pub fn new() -> Self {
        Self::from_harness(TestHarness::new())
    }

    #[must_use]
    pub fn from_harness(harness: TestHarness) -> Self {
        let router = create_router(harness.app_state());
        Self { harness, router }
    }

    /// Send one request through the router.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        auth: &Auth,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "203.0.113.7");
        builder = match auth {
            Auth::None => builder,
            Auth::Cookie(token) => builder.header(header::COOKIE, format!("moov={token}")),
            Auth::Bearer(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
        };
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Request should build");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Body should be readable")
            .to_bytes();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, auth: &Auth) -> TestResponse {
        self.send(Method::GET, uri, auth, None).await
    }

    pub async fn post(&self, uri: &str, auth: &Auth, body: Value) -> TestResponse {
        self.send(Method::POST, uri, auth, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, auth: &Auth) -> TestResponse {
        self.send(Method::DELETE, uri, auth, None).await
    }

    /// An identity with a valid session cookie, able to send invites.
    pub async fn admin(&self) -> (Identity, Auth) {
        let (identity, token) = self.harness.session_token().await;
        (identity, Auth::Cookie(token))
    }

    /// Invite `email` over HTTP and return the code from the captured email.
    pub async fn invite(&self, auth: &Auth, email: &str) -> String {
        let response = self.post("/invites", auth, json!({ "email": email })).await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        self.harness
            .notifier
            .last_invite_code()
            .expect("Invite email should carry a code")
    }

    /// Register Alice with `code`, presenting a fresh upstream ID token for
    /// `subject_id`.
    pub async fn register(&self, code: &str, subject_id: &str, nonce: &str) -> TestResponse {
        self.register_with(code, &self.harness.assertion(subject_id, nonce))
            .await
    }

    pub async fn register_with(&self, code: &str, assertion: &str) -> TestResponse {
        self.post(
            "/register",
            &Auth::None,
            json!({
                "code": code,
                "first_name": "Alice",
                "last_name": "Liddell",
                "assertion": assertion,
            }),
        )
        .await
    }

    /// Log in with a fresh upstream ID token for `subject_id`.
    pub async fn login(&self, subject_id: &str, nonce: &str) -> TestResponse {
        self.login_with(&self.harness.assertion(subject_id, nonce))
            .await
    }

    pub async fn login_with(&self, assertion: &str) -> TestResponse {
        self.post("/login", &Auth::None, json!({ "assertion": assertion }))
            .await
    }
}
