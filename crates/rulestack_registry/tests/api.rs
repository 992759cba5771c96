//! End-to-end tests driving the full middleware stack and handlers
//! against an in-memory database and a temporary blob store.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use rulestack_registry::state::AppState;
use rulestack_registry::{app, db};

async fn test_state() -> (AppState, tempfile::TempDir) {
    let pool = db::connect_in_memory().await.unwrap();
    let storage = tempfile::tempdir().unwrap();
    let state = AppState::new(pool, storage.path().to_path_buf(), "test-secret", 24);
    (state, storage)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

/// A unique client address per request, so tests don't trip the per-IP
/// rate limiter unless they mean to.
fn fresh_ip() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("10.0.{}.{}", (n / 256) % 256, n % 256)
}

fn json_request(method: &str, uri: &str, body: &Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", fresh_ip());
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri(uri)
        .header("x-forwarded-for", fresh_ip());
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn register(router: &Router, username: &str) -> (StatusCode, Value) {
    send(
        router,
        json_request(
            "POST",
            "/v1/auth/register",
            &json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": "correct horse battery",
            }),
            None,
        ),
    )
    .await
}

async fn login(router: &Router, username: &str) -> String {
    let (status, body) = send(
        router,
        json_request(
            "POST",
            "/v1/auth/login",
            &json!({ "username": username, "password": "correct horse battery" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

async fn promote(state: &AppState, username: &str, role: &str) {
    sqlx::query("UPDATE users SET role = ?2 WHERE username = ?1")
        .bind(username)
        .bind(role)
        .execute(&state.db)
        .await
        .unwrap();
}

fn multipart_request(
    uri: &str,
    token: Option<&str>,
    manifest: &Value,
    archive: &[u8],
) -> Request<Body> {
    let boundary = "rulestack-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"manifest\"; \
             filename=\"rulestack.json\"\r\nContent-Type: application/json\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(manifest.to_string().as_bytes());
    body.extend_from_slice(
        format!(
            "\r\n--{boundary}\r\nContent-Disposition: form-data; name=\"archive\"; \
             filename=\"archive.tgz\"\r\nContent-Type: application/gzip\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(archive);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .header("x-forwarded-for", fresh_ip());
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

fn demo_manifest() -> Value {
    json!({
        "name": "sec-rules",
        "version": "1.0.0",
        "description": "security ruleset",
        "files": ["rules.md"],
        "targets": ["claude"],
        "tags": ["security"],
        "license": "MIT",
    })
}

#[tokio::test]
async fn health_is_public() {
    let (state, _storage) = test_state().await;
    let router = app(state);
    let (status, body) = send(&router, get_request("/v1/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn register_login_profile_flow() {
    let (state, _storage) = test_state().await;
    let router = app(state);

    let (status, body) = register(&router, "alice").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["role"], "user");
    assert!(body.get("password_hash").is_none());

    let token = login(&router, "alice").await;
    let (status, body) = send(&router, get_request("/v1/auth/profile", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");

    // No token, no profile.
    let (status, _) = send(&router, get_request("/v1/auth/profile", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A token signed by someone else fails before the session lookup.
    let (status, _) = send(&router, get_request("/v1/auth/profile", Some("forged"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_validates_input() {
    let (state, _storage) = test_state().await;
    let router = app(state);

    let (status, _) = send(
        &router,
        json_request(
            "POST",
            "/v1/auth/register",
            &json!({ "username": "bob", "email": "bob@example.com", "password": "short" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = register(&router, "carol").await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = register(&router, "carol").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("taken"));
}

#[tokio::test]
async fn json_bodies_are_html_stripped() {
    let (state, _storage) = test_state().await;
    let router = app(state);

    let (status, body) = send(
        &router,
        json_request(
            "POST",
            "/v1/auth/register",
            &json!({
                "username": "<script>alert(1)</script>dave",
                "email": "dave@example.com",
                "password": "correct horse battery",
            }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], "dave");
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let (state, _storage) = test_state().await;
    let router = app(state);
    let request = Request::builder()
        .method("POST")
        .uri("/v1/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("JSON"));
}

#[tokio::test]
async fn publish_is_gated_on_the_publisher_role() {
    let (state, _storage) = test_state().await;
    let router = app(state.clone());

    let request = multipart_request("/v1/packages", None, &demo_manifest(), b"bytes");
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    register(&router, "plain").await;
    let token = login(&router, "plain").await;
    let request = multipart_request("/v1/packages", Some(&token), &demo_manifest(), b"bytes");
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("role"));
}

#[tokio::test]
async fn publish_download_roundtrip() {
    let (state, _storage) = test_state().await;
    let router = app(state.clone());

    register(&router, "pub").await;
    promote(&state, "pub", "publisher").await;
    let token = login(&router, "pub").await;

    let archive = b"pretend-gzip-bytes".to_vec();
    let request = multipart_request("/v1/packages", Some(&token), &demo_manifest(), &archive);
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::CREATED, "publish failed: {body}");
    let sha256 = body["sha256"].as_str().unwrap().to_string();
    assert_eq!(body["size"], archive.len() as u64);

    // The version record reports the same hash.
    let (status, body) = send(
        &router,
        get_request("/v1/packages/sec-rules/versions/1.0.0", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sha256"], sha256.as_str());
    assert_eq!(body["tags"][0], "security");

    // Package summary carries the latest version.
    let (status, body) = send(&router, get_request("/v1/packages/sec-rules", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["latest"], "1.0.0");

    // The blob comes back byte-identical.
    let response = router
        .clone()
        .oneshot(get_request(&format!("/v1/blobs/{sha256}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/gzip");
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains(&sha256[..8]));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), archive.as_slice());

    // Publishing the same version again conflicts.
    let request = multipart_request("/v1/packages", Some(&token), &demo_manifest(), &archive);
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Search finds it by name and by tag.
    let (status, body) = send(&router, get_request("/v1/packages?q=sec", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "sec-rules");
    let (status, body) = send(
        &router,
        get_request("/v1/packages?q=&tag=security", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    let (status, body) = send(&router, get_request("/v1/packages?q=&tag=nope", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn missing_package_and_version_are_404() {
    let (state, _storage) = test_state().await;
    let router = app(state);
    let (status, _) = send(&router, get_request("/v1/packages/ghost", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(
        &router,
        get_request("/v1/packages/ghost/versions/1.0.0", None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&router, get_request("/v1/blobs/deadbeef", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_routes_require_the_admin_role() {
    let (state, _storage) = test_state().await;
    let router = app(state.clone());

    register(&router, "eve").await;
    let token = login(&router, "eve").await;
    let (status, _) = send(&router, get_request("/v1/admin/users", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    promote(&state, "eve", "admin").await;
    let (status, body) = send(&router, get_request("/v1/admin/users", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    // Admins cannot delete themselves.
    let own_id = body[0]["id"].as_i64().unwrap();
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/v1/admin/users/{own_id}"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn logout_revokes_the_session() {
    let (state, _storage) = test_state().await;
    let router = app(state);

    register(&router, "frank").await;
    let token = login(&router, "frank").await;
    let (status, _) = send(
        &router,
        json_request("POST", "/v1/auth/logout", &json!({}), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The JWT is still validly signed, but its session row is gone.
    let (status, _) = send(&router, get_request("/v1/auth/profile", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn change_password_revokes_other_sessions() {
    let (state, _storage) = test_state().await;
    let router = app(state);

    register(&router, "grace").await;
    let token_a = login(&router, "grace").await;
    let token_b = login(&router, "grace").await;

    let (status, _) = send(
        &router,
        json_request(
            "POST",
            "/v1/auth/change-password",
            &json!({
                "current_password": "correct horse battery",
                "new_password": "even more correct horse",
            }),
            Some(&token_a),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&router, get_request("/v1/auth/profile", Some(&token_a))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&router, get_request("/v1/auth/profile", Some(&token_b))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unregistered_routes_require_authentication() {
    let (state, _storage) = test_state().await;
    let router = app(state);
    let (status, _) = send(&router, get_request("/v1/does-not-exist", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_attempts_are_rate_limited_per_ip() {
    let (state, _storage) = test_state().await;
    let router = app(state);

    let attempt = |ip: &'static str| {
        Request::builder()
            .method("POST")
            .uri("/v1/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(
                json!({ "username": "nobody", "password": "wrong password" }).to_string(),
            ))
            .unwrap()
    };

    // The login route allows 10 requests per minute per IP.
    for _ in 0..10 {
        let (status, _) = send(&router, attempt("198.51.100.7")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, body) = send(&router, attempt("198.51.100.7")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("rate limit"));

    // Another client is unaffected.
    let (status, _) = send(&router, attempt("203.0.113.5")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn delete_account_refuses_admins() {
    let (state, _storage) = test_state().await;
    let router = app(state.clone());

    register(&router, "heidi").await;
    promote(&state, "heidi", "admin").await;
    let token = login(&router, "heidi").await;

    let request = json_request(
        "DELETE",
        "/v1/auth/delete-account",
        &json!({ "password": "correct horse battery" }),
        Some(&token),
    );
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
