/// Integration tests for the server-rendered web UI
///
/// These verify the cookie-session flows end-to-end:
/// - CSRF double-submit enforcement on form POSTs
/// - Login/registration pages and redirects
/// - Task list rendering and form actions
/// - Inline-edit fragments
///
/// Each test returns early when `DATABASE_URL` is not set.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::TestContext;

fn web_form_request(uri: &str, cookies: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, cookies)
        .body(Body::from(body))
        .expect("request builds")
}

fn web_get_request(uri: &str, cookies: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::COOKIE, cookies)
        .body(Body::empty())
        .expect("request builds")
}

/// Fetches the login page and returns its CSRF token
async fn fetch_csrf_token(ctx: &TestContext) -> String {
    let response = common::send(&ctx.app, common::get_request("/login", None)).await;
    let response = common::expect_status(response, StatusCode::OK).await;
    common::response_cookie(&response, "csrftoken").expect("csrftoken cookie set")
}

/// Logs the context user in through the web form; returns the auth cookie value
async fn web_login(ctx: &TestContext) -> String {
    let csrf = fetch_csrf_token(ctx).await;
    let body = format!(
        "email={}&password=secret-123&csrf_token={}",
        ctx.user.email, csrf
    );
    let response = common::send(
        &ctx.app,
        web_form_request("/login", &format!("csrftoken={}", csrf), body),
    )
    .await;
    let response = common::expect_status(response, StatusCode::SEE_OTHER).await;
    common::response_cookie(&response, "access_token").expect("access_token cookie set")
}

#[tokio::test]
async fn test_login_page_sets_csrf_cookie() {
    let Some(ctx) = TestContext::try_new().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let response = common::send(&ctx.app, common::get_request("/login", None)).await;
    let response = common::expect_status(response, StatusCode::OK).await;
    let token = common::response_cookie(&response, "csrftoken").expect("csrftoken cookie set");

    // The form embeds the same token the cookie carries
    let html = common::body_text(response).await;
    assert!(html.contains(&token));
}

#[tokio::test]
async fn test_login_without_csrf_is_forbidden() {
    let Some(ctx) = TestContext::try_new().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let body = format!("email={}&password=secret-123", ctx.user.email);
    let request = Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap();

    let response = common::send(&ctx.app, request).await;
    common::expect_status(response, StatusCode::FORBIDDEN).await;
}

#[tokio::test]
async fn test_login_with_mismatched_csrf_pair() {
    let Some(ctx) = TestContext::try_new().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    // Two individually valid tokens that don't match each other
    let cookie_token = fetch_csrf_token(&ctx).await;
    let form_token = fetch_csrf_token(&ctx).await;
    assert_ne!(cookie_token, form_token);

    let body = format!(
        "email={}&password=secret-123&csrf_token={}",
        ctx.user.email, form_token
    );
    let response = common::send(
        &ctx.app,
        web_form_request("/login", &format!("csrftoken={}", cookie_token), body),
    )
    .await;
    common::expect_status(response, StatusCode::FORBIDDEN).await;
}

#[tokio::test]
async fn test_login_with_csrf_but_bad_credentials() {
    let Some(ctx) = TestContext::try_new().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let csrf = fetch_csrf_token(&ctx).await;
    let body = format!("email=not@exists.example&password=bad&csrf_token={}", csrf);
    let response = common::send(
        &ctx.app,
        web_form_request("/login", &format!("csrftoken={}", csrf), body),
    )
    .await;

    // CSRF passed; the credential check is what fails
    common::expect_status(response, StatusCode::UNAUTHORIZED).await;
}

#[tokio::test]
async fn test_web_login_success_sets_auth_cookie() {
    let Some(ctx) = TestContext::try_new().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let cookie = web_login(&ctx).await;
    assert!(!cookie.is_empty());

    // The cookie works for the task list page
    let response = common::send(
        &ctx.app,
        web_get_request("/", &format!("access_token={}", cookie)),
    )
    .await;
    let response = common::expect_status(response, StatusCode::OK).await;
    let html = common::body_text(response).await;
    assert!(html.contains(&ctx.user.email));
}

#[tokio::test]
async fn test_register_web_flow() {
    let Some(ctx) = TestContext::try_new().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let response = common::send(&ctx.app, common::get_request("/register", None)).await;
    let response = common::expect_status(response, StatusCode::OK).await;
    let csrf = common::response_cookie(&response, "csrftoken").expect("csrftoken cookie set");

    let email = format!("ui-reg-{}@example.com", uuid::Uuid::new_v4());
    let body = format!(
        "email={}&password=secret-123&csrf_token={}",
        email, csrf
    );
    let response = common::send(
        &ctx.app,
        web_form_request("/register", &format!("csrftoken={}", csrf), body.clone()),
    )
    .await;
    let response = common::expect_status(response, StatusCode::SEE_OTHER).await;
    assert!(common::response_cookie(&response, "access_token").is_some());

    // A duplicate registration renders an error page with 400
    let csrf2 = fetch_csrf_token(&ctx).await;
    let body = format!(
        "email={}&password=secret-123&csrf_token={}",
        email, csrf2
    );
    let response = common::send(
        &ctx.app,
        web_form_request("/register", &format!("csrftoken={}", csrf2), body),
    )
    .await;
    let response = common::expect_status(response, StatusCode::BAD_REQUEST).await;
    let html = common::body_text(response).await;
    assert!(html.contains("already registered"));
}

#[tokio::test]
async fn test_index_redirects_anonymous_to_login() {
    let Some(ctx) = TestContext::try_new().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let response = common::send(&ctx.app, common::get_request("/", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some("/login")
    );
}

#[tokio::test]
async fn test_create_task_from_form() {
    let Some(ctx) = TestContext::try_new().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let auth_cookie = web_login(&ctx).await;
    let csrf = fetch_csrf_token(&ctx).await;
    let cookies = format!("access_token={}; csrftoken={}", auth_cookie, csrf);

    let body = format!("title=From+the+form&priority=4&csrf_token={}", csrf);
    let response = common::send(&ctx.app, web_form_request("/ui/tasks", &cookies, body)).await;
    common::expect_status(response, StatusCode::SEE_OTHER).await;

    let response = common::send(&ctx.app, web_get_request("/", &cookies)).await;
    let html = common::body_text(response).await;
    assert!(html.contains("From the form"));
}

#[tokio::test]
async fn test_inline_edit_fragments() {
    let Some(ctx) = TestContext::try_new().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let task = ctx.create_task(ctx.user.id, "Edit me", 2).await;
    let auth_cookie = web_login(&ctx).await;
    let csrf = fetch_csrf_token(&ctx).await;
    let cookies = format!("access_token={}; csrftoken={}", auth_cookie, csrf);

    // Fragment requests without a session answer 401, not a redirect
    let response = common::send(
        &ctx.app,
        common::get_request(&format!("/ui/tasks/{}/row", task.id), None),
    )
    .await;
    common::expect_status(response, StatusCode::UNAUTHORIZED).await;

    // The row fragment carries only the task row, not a full page
    let response = common::send(
        &ctx.app,
        web_get_request(&format!("/ui/tasks/{}/row", task.id), &cookies),
    )
    .await;
    let response = common::expect_status(response, StatusCode::OK).await;
    let html = common::body_text(response).await;
    assert!(html.contains("Edit me"));
    assert!(!html.contains("<html"));

    // The edit fragment offers the form
    let response = common::send(
        &ctx.app,
        web_get_request(&format!("/ui/tasks/{}/edit", task.id), &cookies),
    )
    .await;
    let response = common::expect_status(response, StatusCode::OK).await;
    let html = common::body_text(response).await;
    assert!(html.contains("name=\"title\""));

    // Applying the edit returns the updated row fragment only
    let body = format!(
        "title=Edited+title&status=in_progress&priority=5&csrf_token={}",
        csrf
    );
    let response = common::send(
        &ctx.app,
        web_form_request(&format!("/ui/tasks/{}", task.id), &cookies, body),
    )
    .await;
    let response = common::expect_status(response, StatusCode::OK).await;
    let html = common::body_text(response).await;
    assert!(html.contains("Edited title"));
    assert!(html.contains("in_progress"));
    assert!(!html.contains("<html"));
}

#[tokio::test]
async fn test_bulk_delete_from_form() {
    let Some(ctx) = TestContext::try_new().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let keep = ctx.create_task(ctx.user.id, "Keep me", 1).await;
    let drop_a = ctx.create_task(ctx.user.id, "Drop A", 1).await;
    let drop_b = ctx.create_task(ctx.user.id, "Drop B", 1).await;

    let auth_cookie = web_login(&ctx).await;
    let csrf = fetch_csrf_token(&ctx).await;
    let cookies = format!("access_token={}; csrftoken={}", auth_cookie, csrf);

    let body = format!(
        "ids={}&ids={}&csrf_token={}",
        drop_a.id, drop_b.id, csrf
    );
    let response = common::send(&ctx.app, web_form_request("/ui/bulk_delete", &cookies, body)).await;
    common::expect_status(response, StatusCode::SEE_OTHER).await;

    let response = common::send(&ctx.app, web_get_request("/", &cookies)).await;
    let html = common::body_text(response).await;
    assert!(html.contains("Keep me"));
    assert!(!html.contains("Drop A"));
    assert!(!html.contains("Drop B"));
    let _ = keep;
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let Some(ctx) = TestContext::try_new().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let auth_cookie = web_login(&ctx).await;
    let csrf = fetch_csrf_token(&ctx).await;
    let cookies = format!("access_token={}; csrftoken={}", auth_cookie, csrf);

    let body = format!("csrf_token={}", csrf);
    let response = common::send(&ctx.app, web_form_request("/logout", &cookies, body)).await;
    let response = common::expect_status(response, StatusCode::SEE_OTHER).await;
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some("/login")
    );

    // The Set-Cookie header expires the auth cookie
    let cleared = common::response_cookie(&response, "access_token").unwrap_or_default();
    assert!(cleared.is_empty());
}
