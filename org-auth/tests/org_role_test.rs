mod common;

use axum::http::StatusCode;
use common::{body_json, TestApp};
use org_auth::models::OrgRole;

#[tokio::test]
async fn test_org_context_requires_session() {
    let app = TestApp::spawn();
    app.create_org("acme", None).await;

    let res = app.get("/orgs/acme/context", None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_org_context_for_member() {
    let app = TestApp::spawn();
    let org = app.create_org("acme", None).await;
    let cookie = app
        .member_session(&org, "viewer@example.com", OrgRole::Viewer)
        .await;

    let res = app.get("/orgs/ACME/context", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["org_id"], org.org_id.to_string());
    assert_eq!(body["slug"], "acme");
    assert_eq!(body["role"], "Viewer");
}

#[tokio::test]
async fn test_org_context_denials_are_generic_403() {
    let app = TestApp::spawn();
    let acme = app.create_org("acme", None).await;
    let other = app.create_org("other", None).await;
    let cookie = app
        .member_session(&acme, "ann@example.com", OrgRole::Admin)
        .await;

    // Not a member of `other`.
    let res = app.get("/orgs/other/context", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(res).await["error"], "Forbidden");

    // Member of `other`, but the session is still bound to `acme`.
    app.add_member(&other, "ann@example.com", OrgRole::Viewer).await;
    let res = app.get("/orgs/other/context", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Unknown organization looks the same as a foreign one.
    let res = app.get("/orgs/ghost/context", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(res).await["error"], "Forbidden");
}

#[tokio::test]
async fn test_admin_routes_reject_lower_roles() {
    let app = TestApp::spawn();
    let org = app.create_org("acme", None).await;
    let member = app
        .member_session(&org, "member@example.com", OrgRole::Member)
        .await;

    let res = app
        .post_json(
            "/orgs/acme/invites",
            serde_json::json!({ "email": "new@example.com", "role": "Viewer" }),
            Some(&member),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(res).await["error"], "Forbidden");

    let res = app
        .put_json(
            "/orgs/acme/role-mappings",
            serde_json::json!({ "provider": "corp", "group_id": "G1", "role": "Member" }),
            Some(&member),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_owner_passes_admin_gate() {
    let app = TestApp::spawn();
    let org = app.create_org("acme", None).await;
    let owner = app
        .member_session(&org, "owner@example.com", OrgRole::Owner)
        .await;

    let res = app
        .put_json(
            "/orgs/acme/role-mappings",
            serde_json::json!({ "provider": "Corp", "group_id": "G2", "role": "admin" }),
            Some(&owner),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["provider"], "corp");
    assert_eq!(body["role"], "Admin");
}

#[tokio::test]
async fn test_role_mapping_cannot_target_owner() {
    let app = TestApp::spawn();
    let org = app.create_org("acme", None).await;
    let admin = app
        .member_session(&org, "admin@example.com", OrgRole::Admin)
        .await;

    for role in ["Owner", "superuser"] {
        let res = app
            .put_json(
                "/orgs/acme/role-mappings",
                serde_json::json!({ "provider": "corp", "group_id": "G1", "role": role }),
                Some(&admin),
            )
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "invalid role");
    }
}
