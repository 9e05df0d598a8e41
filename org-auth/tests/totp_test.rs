mod common;

use axum::http::StatusCode;
use common::{body_json, TestApp, PASSWORD};
use org_auth::utils::totp::{base32_decode, hotp, time_step};

fn code_for(secret: &str, step: i64) -> String {
    let key = base32_decode(secret).unwrap();
    format!("{:06}", hotp(&key, step as u64, 6).unwrap())
}

#[tokio::test]
async fn test_totp_enrollment_then_login_requires_code() {
    let app = TestApp::spawn();
    let cookie = app.signup("mfa@example.com").await;

    let res = app.get("/auth/mfa/totp/setup", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let setup = body_json(res).await;
    let secret = setup["secret"].as_str().unwrap().to_string();
    assert_eq!(setup["label"], "mfa@example.com");
    assert!(setup["otpauth_url"]
        .as_str()
        .unwrap()
        .starts_with("otpauth://totp/"));

    let res = app
        .post_json(
            "/auth/mfa/totp/verify",
            serde_json::json!({ "code": "123" }),
            Some(&cookie),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let step = time_step(chrono::Utc::now().timestamp());
    let res = app
        .post_json(
            "/auth/mfa/totp/verify",
            serde_json::json!({ "code": code_for(&secret, step) }),
            Some(&cookie),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    // Enrollment is now fixed.
    let res = app.get("/auth/mfa/totp/setup", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app
        .post_json(
            "/auth/login",
            serde_json::json!({ "email": "mfa@example.com", "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(res).await["error"], "Second factor required");

    let next = code_for(&secret, step + 1);
    let login = |code: String| {
        serde_json::json!({ "email": "mfa@example.com", "password": PASSWORD, "totp_code": code })
    };
    let res = app.post_json("/auth/login", login(next.clone()), None).await;
    assert_eq!(res.status(), StatusCode::OK);

    // Replaying the same code is refused.
    let res = app.post_json("/auth/login", login(next), None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_totp_verify_without_setup() {
    let app = TestApp::spawn();
    let cookie = app.signup("nosetup@example.com").await;

    let res = app
        .post_json(
            "/auth/mfa/totp/verify",
            serde_json::json!({ "code": "123456" }),
            Some(&cookie),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "TOTP setup not started");
}

#[tokio::test]
async fn test_totp_wrong_code_rejected() {
    let app = TestApp::spawn();
    let cookie = app.signup("wrong@example.com").await;
    let setup = body_json(app.get("/auth/mfa/totp/setup", Some(&cookie)).await).await;
    let secret = setup["secret"].as_str().unwrap();

    let step = time_step(chrono::Utc::now().timestamp());
    let far_future = code_for(secret, step + 100);
    let res = app
        .post_json(
            "/auth/mfa/totp/verify",
            serde_json::json!({ "code": far_future }),
            Some(&cookie),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "invalid code");
}
