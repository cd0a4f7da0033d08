//! Proxy routes end to end against a mock upstream.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use folio_core::{JwtCodec, ProxySettings};
use folio_server::{router, AppState};
use folio_storage::NewUser;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "e2e-secret";

fn app() -> (Router, String) {
    let settings = ProxySettings {
        allowed_domains: vec!["127.0.0.1".into()],
        attempt_timeout_secs: 2,
        ..ProxySettings::default()
    };
    let state = AppState::in_memory(&settings, JwtCodec::new(SECRET)).expect("state builds");

    let user = state
        .db
        .create_user(NewUser {
            username: "reader".into(),
            email: "reader@example.com".into(),
            password_hash: "opaque".into(),
        })
        .expect("user created");
    let token = JwtCodec::new(SECRET).issue(user.id).expect("token issued");

    (router(state), token)
}

fn encode(url: &str) -> String {
    url.replace(':', "%3A").replace('/', "%2F").replace('?', "%3F")
}

async fn fetch(app: Router, uri: String, bearer: Option<&str>) -> axum::response::Response {
    let mut request = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        request = request.header("authorization", format!("Bearer {token}"));
    }

    app.oneshot(request.body(Body::empty()).expect("request builds"))
        .await
        .expect("router responds")
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

#[tokio::test]
async fn proxies_rewritten_page_with_frame_headers() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/novel/chapter-3"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<head><title>T</title></head><body>ok</body>"),
        )
        .mount(&upstream)
        .await;

    let (app, token) = app();
    let target = format!("{}/novel/chapter-3", upstream.uri());
    let response = fetch(
        app,
        format!("/api/books/proxy/iframe?url={}&token={token}", encode(&target)),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-frame-options"], "SAMEORIGIN");
    assert_eq!(
        response.headers()["content-security-policy"],
        "frame-ancestors 'self'"
    );
    assert_eq!(
        response.headers()["content-type"],
        "text/html; charset=utf-8"
    );

    let body = body_text(response).await;
    assert_eq!(
        body,
        format!(r#"<head><base href="{target}"><title>T</title></head><body>ok</body>"#)
    );
}

#[tokio::test]
async fn bearer_header_works_without_query_token() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<head></head>ok"))
        .mount(&upstream)
        .await;

    let (app, token) = app();
    let target = format!("{}/page", upstream.uri());
    let response = fetch(
        app,
        format!("/api/books/proxy/iframe?url={}", encode(&target)),
        Some(&token),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn challenge_page_is_forbidden_with_suggestion() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><head><title>Just a moment...</title></head><body>cf_chl_opt</body></html>",
        ))
        .mount(&upstream)
        .await;

    let (app, token) = app();
    let target = format!("{}/page", upstream.uri());
    let response = fetch(
        app,
        format!("/api/books/proxy/iframe?url={}&token={token}", encode(&target)),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json: serde_json::Value =
        serde_json::from_str(&body_text(response).await).expect("json error body");
    assert_eq!(json["code"], "challenge_blocked");
    assert!(json["suggestion"].is_string());
}

#[tokio::test]
async fn upstream_status_is_passed_through() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such chapter"))
        .expect(3)
        .mount(&upstream)
        .await;

    let (app, token) = app();
    let target = format!("{}/missing", upstream.uri());
    let response = fetch(
        app,
        format!("/api/books/proxy/iframe?url={}&token={token}", encode(&target)),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unreachable_upstream_is_service_unavailable() {
    let (app, token) = app();
    let response = fetch(
        app,
        format!(
            "/api/books/proxy/iframe?url={}&token={token}",
            encode("http://127.0.0.1:1/gone")
        ),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn redirect_to_other_host_is_forbidden() {
    let upstream = MockServer::start().await;
    let port = upstream.address().port();
    Mock::given(method("GET"))
        .and(path("/go"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("http://localhost:{port}/admin")),
        )
        .expect(1)
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin"))
        .respond_with(ResponseTemplate::new(200).set_body_string("internal"))
        .expect(0)
        .mount(&upstream)
        .await;

    let (app, token) = app();
    let target = format!("{}/go", upstream.uri());
    let response = fetch(
        app,
        format!("/api/books/proxy/iframe?url={}&token={token}", encode(&target)),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json: serde_json::Value =
        serde_json::from_str(&body_text(response).await).expect("json error body");
    assert_eq!(json["code"], "domain_not_allowed");
}

#[tokio::test]
async fn latin1_page_is_served_as_utf8() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_bytes(
                    b"<head><meta charset=\"iso-8859-1\"></head><body>caf\xE9</body>".to_vec(),
                ),
        )
        .mount(&upstream)
        .await;

    let (app, token) = app();
    let target = format!("{}/menu", upstream.uri());
    let response = fetch(
        app,
        format!("/api/books/proxy/iframe?url={}&token={token}", encode(&target)),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/html; charset=utf-8"
    );

    let body = body_text(response).await;
    assert!(body.contains("<body>café</body>"), "body: {body}");
    assert!(!body.contains('\u{FFFD}'));
}
