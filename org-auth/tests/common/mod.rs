//! Shared setup for org-auth integration tests.
//!
//! Builds the real router over the in-memory repository and session store
//! and drives it with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use org_auth::{
    build_router,
    config::AuthConfig,
    models::{Organization, OrgRole, RoleReconcile},
    services::{
        AuthRepository, InMemoryRepository, MemorySessionStore, ProviderRegistry, SessionStore,
    },
    AppState,
};
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const BASE_URL: &str = "http://auth.test";
pub const PASSWORD: &str = "correct-horse-battery";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub repo: Arc<InMemoryRepository>,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::spawn_with_providers(ProviderRegistry::new())
    }

    pub fn spawn_with_providers(providers: ProviderRegistry) -> Self {
        Self::spawn_with(AuthConfig::local(BASE_URL), providers)
    }

    pub fn spawn_with_config(config: AuthConfig) -> Self {
        Self::spawn_with(config, ProviderRegistry::new())
    }

    fn spawn_with(config: AuthConfig, providers: ProviderRegistry) -> Self {
        let repo = Arc::new(InMemoryRepository::new());
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());

        let state = AppState::new(
            config,
            repo.clone() as Arc<dyn AuthRepository>,
            sessions,
            providers,
        );

        Self {
            router: build_router(state.clone()),
            state,
            repo,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        self.send(request(Method::GET, uri, None, cookie)).await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        body: serde_json::Value,
        cookie: Option<&str>,
    ) -> Response<Body> {
        self.send(request(Method::POST, uri, Some(body), cookie)).await
    }

    pub async fn put_json(
        &self,
        uri: &str,
        body: serde_json::Value,
        cookie: Option<&str>,
    ) -> Response<Body> {
        self.send(request(Method::PUT, uri, Some(body), cookie)).await
    }

    /// Sign up through HTTP and return the `session=...` cookie pair.
    pub async fn signup(&self, email: &str) -> String {
        let res = self
            .post_json(
                "/auth/signup",
                serde_json::json!({ "email": email, "password": PASSWORD, "name": "Test User" }),
                None,
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        session_cookie(&res).expect("signup sets a session cookie")
    }

    pub async fn login(&self, email: &str) -> String {
        let res = self
            .post_json(
                "/auth/login",
                serde_json::json!({ "email": email, "password": PASSWORD }),
                None,
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        session_cookie(&res).expect("login sets a session cookie")
    }

    pub async fn user_id(&self, email: &str) -> Uuid {
        self.repo
            .find_user_by_email(email)
            .await
            .unwrap()
            .expect("user exists")
            .user_id
    }

    pub async fn create_org(&self, slug: &str, tenant_id: Option<&str>) -> Organization {
        let org = Organization::new(slug, &slug.to_uppercase(), tenant_id.map(str::to_string));
        self.repo.create_organization(&org).await.unwrap();
        org
    }

    pub async fn add_member(&self, org: &Organization, email: &str, role: OrgRole) {
        let user_id = self.user_id(email).await;
        self.repo
            .upsert_membership(org.org_id, user_id, role, RoleReconcile::Elevate)
            .await
            .unwrap();
    }

    /// Sign up, join `org` at `role` and log in again so the session is bound to it.
    pub async fn member_session(&self, org: &Organization, email: &str, role: OrgRole) -> String {
        self.signup(email).await;
        self.add_member(org, email, role).await;
        self.login(email).await
    }
}

pub fn request(
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
    cookie: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// All `Set-Cookie` headers of a response.
pub fn set_cookies(res: &Response<Body>) -> Vec<String> {
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// `name=value` pair of the named cookie set by a response, if any.
pub fn cookie_pair(res: &Response<Body>, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    set_cookies(res)
        .into_iter()
        .find(|c| c.starts_with(&prefix))
        .and_then(|c| c.split(';').next().map(str::to_string))
        .filter(|pair| pair.len() > prefix.len())
}

pub fn session_cookie(res: &Response<Body>) -> Option<String> {
    cookie_pair(res, "session")
}

pub async fn body_json(res: Response<Body>) -> serde_json::Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location(res: &Response<Body>) -> String {
    res.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
