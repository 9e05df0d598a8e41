mod common;

use axum::http::{header, Method, Request, StatusCode};
use common::{body_json, location, session_cookie, TestApp};
use org_auth::models::OrgRole;

/// Issue an invite as an Admin of `acme` and return the plaintext token.
async fn issue(app: &TestApp, admin_cookie: &str, email: &str, role: &str) -> String {
    let res = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/orgs/acme/invites")
                .header(header::COOKIE, admin_cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-forwarded-proto", "https")
                .header("x-forwarded-host", "app.example.com")
                .body(axum::body::Body::from(
                    serde_json::json!({ "email": email, "role": role }).to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let body = body_json(res).await;
    assert_eq!(body["ok"], true);
    let url = body["accept_url"].as_str().unwrap().to_string();
    let prefix = "https://app.example.com/invite/accept?token=";
    assert!(url.starts_with(prefix), "unexpected accept url {url}");
    url[prefix.len()..].to_string()
}

async fn admin_app() -> (TestApp, String) {
    let app = TestApp::spawn();
    let org = app.create_org("acme", None).await;
    let admin = app
        .member_session(&org, "admin@example.com", OrgRole::Admin)
        .await;
    (app, admin)
}

#[tokio::test]
async fn test_invite_accept_grants_role_and_rotates_session() {
    let (app, admin) = admin_app().await;
    let token = issue(&app, &admin, "Guest@Example.com", "Member").await;

    let guest = app.signup("guest@example.com").await;
    let res = app
        .post_json(
            "/auth/invite/accept",
            serde_json::json!({ "token": token }),
            Some(&guest),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let rotated = session_cookie(&res).unwrap();
    let body = body_json(res).await;
    assert_eq!(body["role"], "Member");

    assert_eq!(
        app.get("/auth/me", Some(&guest)).await.status(),
        StatusCode::UNAUTHORIZED
    );
    let ctx = body_json(app.get("/orgs/acme/context", Some(&rotated)).await).await;
    assert_eq!(ctx["role"], "Member");
}

#[tokio::test]
async fn test_invite_is_single_use() {
    let (app, admin) = admin_app().await;
    let token = issue(&app, &admin, "once@example.com", "Viewer").await;
    let guest = app.signup("once@example.com").await;

    let res = app
        .post_json(
            "/auth/invite/accept",
            serde_json::json!({ "token": token }),
            Some(&guest),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let rotated = session_cookie(&res).unwrap();

    let res = app
        .post_json(
            "/auth/invite/accept",
            serde_json::json!({ "token": token }),
            Some(&rotated),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(res).await["error"], "invite expired or used");
}

#[tokio::test]
async fn test_invite_email_must_match() {
    let (app, admin) = admin_app().await;
    let token = issue(&app, &admin, "intended@example.com", "Member").await;
    let other = app.signup("someone-else@example.com").await;

    let res = app
        .post_json(
            "/auth/invite/accept",
            serde_json::json!({ "token": token }),
            Some(&other),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(res).await["error"], "Forbidden");

    // The failed attempt does not consume the invite.
    let intended = app.signup("intended@example.com").await;
    let res = app
        .post_json(
            "/auth/invite/accept",
            serde_json::json!({ "token": token }),
            Some(&intended),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_token_is_invalid() {
    let (app, _) = admin_app().await;
    let guest = app.signup("guest@example.com").await;

    let res = app
        .post_json(
            "/auth/invite/accept",
            serde_json::json!({ "token": "no-such-token" }),
            Some(&guest),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "invalid invite");

    let res = app.get("/invite/accept", Some(&guest)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_owner_invites_are_refused() {
    let (app, admin) = admin_app().await;

    let res = app
        .post_json(
            "/orgs/acme/invites",
            serde_json::json!({ "email": "boss@example.com", "role": "Owner" }),
            Some(&admin),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "invalid role");
}

#[tokio::test]
async fn test_invite_role_defaults_to_member() {
    let (app, admin) = admin_app().await;

    let res = app
        .post_json(
            "/orgs/acme/invites",
            serde_json::json!({ "email": "plain@example.com" }),
            Some(&admin),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(body_json(res).await["role"], "Member");
}

#[tokio::test]
async fn test_accept_link_redirects_to_frontend() {
    let (app, admin) = admin_app().await;
    let token = issue(&app, &admin, "link@example.com", "Viewer").await;
    let guest = app.signup("link@example.com").await;

    let res = app
        .get(&format!("/invite/accept?token={}", token), Some(&guest))
        .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "http://localhost:3000/app/work-orders");
    assert!(session_cookie(&res).is_some());
}

#[tokio::test]
async fn test_accept_never_lowers_existing_role() {
    let (app, admin) = admin_app().await;
    let token = issue(&app, &admin, "admin@example.com", "Viewer").await;

    let res = app
        .post_json(
            "/auth/invite/accept",
            serde_json::json!({ "token": token }),
            Some(&admin),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["role"], "Admin");
}
