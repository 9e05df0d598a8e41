pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Duration;
use service_core::middleware::{
    request_id_middleware, security_headers_middleware, REQUEST_ID_HEADER,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AuthConfig;
use crate::middleware::{org_context_middleware, require_role, require_session};
use crate::models::OrgRole;
use crate::services::{
    AuthRepository, AuthService, AuthSettings, InviteManager, OrgRoleResolver, ProviderRegistry,
    SessionStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub repo: Arc<dyn AuthRepository>,
    pub sessions: Arc<dyn SessionStore>,
    pub providers: ProviderRegistry,
    pub auth: AuthService,
    pub invites: InviteManager,
    pub orgs: OrgRoleResolver,
}

impl AppState {
    pub fn new(
        config: AuthConfig,
        repo: Arc<dyn AuthRepository>,
        sessions: Arc<dyn SessionStore>,
        providers: ProviderRegistry,
    ) -> Self {
        let session_ttl = Duration::hours(config.session.ttl_hours);
        let settings = AuthSettings {
            password_params: config.password,
            session_ttl,
            totp_issuer: config.totp_issuer.clone(),
            default_signin_role: config.default_signin_role,
        };

        Self {
            auth: AuthService::new(repo.clone(), sessions.clone(), settings),
            invites: InviteManager::new(
                repo.clone(),
                sessions.clone(),
                Duration::hours(config.invite_ttl_hours),
                session_ttl,
            ),
            orgs: OrgRoleResolver::new(repo.clone()),
            config,
            repo,
            sessions,
            providers,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // Layers added later run first: session, then org binding, then role.
    let org_admin_routes = Router::new()
        .route("/orgs/:slug/invites", post(handlers::invite::create_invite))
        .route(
            "/orgs/:slug/role-mappings",
            put(handlers::org::set_role_mapping),
        )
        .route_layer(from_fn_with_state(OrgRole::Admin, require_role));

    let org_member_routes = Router::new()
        .route("/orgs/:slug/context", get(handlers::org::context))
        .route_layer(from_fn_with_state(OrgRole::Viewer, require_role));

    let org_routes = org_admin_routes
        .merge(org_member_routes)
        .route_layer(from_fn_with_state(state.clone(), org_context_middleware))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    let session_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/set-password", post(handlers::auth::set_password))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/orgs", get(handlers::auth::list_organizations))
        .route("/auth/switch-org", post(handlers::auth::switch_organization))
        .route("/auth/mfa/totp/setup", get(handlers::totp::setup))
        .route("/auth/mfa/totp/verify", post(handlers::totp::verify))
        .route("/auth/invite/accept", post(handlers::invite::accept_invite))
        .route("/invite/accept", get(handlers::invite::accept_invite_link))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/:provider", get(handlers::oauth::start))
        .route("/auth/:provider/callback", get(handlers::oauth::callback))
        .merge(session_routes)
        .merge(org_routes)
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");

            tracing::info_span!(
                "http_request",
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri().path(),
            )
        }))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter(|o| {
            if o.as_str() == "*" {
                tracing::error!("Ignoring wildcard CORS origin, credentials are allowed");
                return false;
            }
            true
        })
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let repo = state.repo.health_check().await;
    let sessions = state.sessions.health_check().await;

    let status = |r: &Result<(), services::ServiceError>| match r {
        Ok(()) => "ok",
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            "unavailable"
        }
    };
    let healthy = repo.is_ok() && sessions.is_ok();
    let body = serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "service": state.config.service_name,
        "version": state.config.service_version,
        "repository": status(&repo),
        "sessions": status(&sessions),
    });

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}
