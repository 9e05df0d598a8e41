use service_core::config::{self as core_config, get_env, get_env_opt, get_env_parsed};
use service_core::error::AppError;

pub use service_core::config::Environment;

use crate::models::OrgRole;
use crate::utils::PasswordParams;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// Externally reachable origin of this service, used for provider callbacks.
    pub base_url: String,
    /// `None` runs against the in-memory repository (dev only).
    pub database: Option<DatabaseConfig>,
    pub session: SessionConfig,
    pub invite_ttl_hours: i64,
    pub password: PasswordParams,
    pub totp_issuer: String,
    pub frontend_url: String,
    pub post_login_path: String,
    pub default_signin_role: OrgRole,
    pub allowed_origins: Vec<String>,
    pub oidc_providers: Vec<OidcProviderConfig>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackend {
    Memory,
    Redis,
}

impl std::str::FromStr for SessionBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(SessionBackend::Memory),
            "redis" => Ok(SessionBackend::Redis),
            _ => Err(format!("Invalid session backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    pub redis_url: Option<String>,
    pub ttl_hours: i64,
    pub cookie_secure: bool,
}

/// One OpenID Connect provider, configured through `OIDC_<NAME>_*` variables.
#[derive(Clone)]
pub struct OidcProviderConfig {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scopes: String,
    pub groups_claim: String,
    pub tenant_claim: String,
}

impl std::fmt::Debug for OidcProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcProviderConfig")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("userinfo_url", &self.userinfo_url)
            .finish_non_exhaustive()
    }
}

impl OidcProviderConfig {
    fn from_env(name: &str) -> Result<Self, AppError> {
        let prefix = format!("OIDC_{}", name.to_uppercase().replace('-', "_"));
        let key = |suffix: &str| format!("{}_{}", prefix, suffix);

        Ok(Self {
            name: name.to_lowercase(),
            client_id: get_env(&key("CLIENT_ID"), None)?,
            client_secret: get_env(&key("CLIENT_SECRET"), None)?,
            auth_url: get_env(&key("AUTH_URL"), None)?,
            token_url: get_env(&key("TOKEN_URL"), None)?,
            userinfo_url: get_env(&key("USERINFO_URL"), None)?,
            scopes: get_env(&key("SCOPES"), Some("openid email profile"))?,
            groups_claim: get_env(&key("GROUPS_CLAIM"), Some("groups"))?,
            tenant_claim: get_env(&key("TENANT_CLAIM"), Some("tid"))?,
        })
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let environment: Environment = get_env("ENVIRONMENT", Some("dev"))?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let database = match get_env_opt("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: get_env_parsed("DATABASE_MAX_CONNECTIONS", 10)?,
                min_connections: get_env_parsed("DATABASE_MIN_CONNECTIONS", 1)?,
            }),
            None => None,
        };

        let backend: SessionBackend = get_env("SESSION_BACKEND", Some("memory"))?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let defaults = PasswordParams::default();
        let password = PasswordParams {
            memory_kib: get_env_parsed("PASSWORD_MEMORY_KIB", defaults.memory_kib)?,
            iterations: get_env_parsed("PASSWORD_ITERATIONS", defaults.iterations)?,
            parallelism: get_env_parsed("PASSWORD_PARALLELISM", defaults.parallelism)?,
            ..defaults
        };

        let default_signin_role: OrgRole = get_env("DEFAULT_SIGNIN_ROLE", Some("Member"))?
            .parse()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("DEFAULT_SIGNIN_ROLE: {}", e)))?;

        let oidc_providers = split_list(&get_env("OIDC_PROVIDERS", Some(""))?)
            .iter()
            .map(|name| OidcProviderConfig::from_env(name))
            .collect::<Result<Vec<_>, _>>()?;

        let config = AuthConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("org-auth"))?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")))?,
            log_level: get_env("LOG_LEVEL", Some("info"))?,
            otlp_endpoint: get_env_opt("OTLP_ENDPOINT"),
            base_url: get_env("BASE_URL", None)?,
            database,
            session: SessionConfig {
                backend,
                redis_url: get_env_opt("REDIS_URL"),
                ttl_hours: get_env_parsed("SESSION_TTL_HOURS", 8)?,
                cookie_secure: get_env_parsed("SESSION_COOKIE_SECURE", true)?,
            },
            invite_ttl_hours: get_env_parsed(
                "INVITE_TTL_HOURS",
                crate::services::DEFAULT_INVITE_TTL_HOURS,
            )?,
            password,
            totp_issuer: get_env("TOTP_ISSUER", Some("Work Orders"))?,
            frontend_url: get_env("FRONTEND_URL", Some("http://localhost:3000"))?,
            post_login_path: get_env("POST_LOGIN_PATH", Some("/app/work-orders"))?,
            default_signin_role,
            allowed_origins: split_list(&get_env(
                "ALLOWED_ORIGINS",
                Some("http://localhost:3000"),
            )?),
            oidc_providers,
        };

        config.validate()?;
        Ok(config)
    }

    /// Dev settings with in-memory storage, cheap password hashing and plain
    /// HTTP cookies. Used by tests and local runs.
    pub fn local(base_url: &str) -> Self {
        AuthConfig {
            common: core_config::Config { port: 8080 },
            environment: Environment::Dev,
            service_name: "org-auth".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            base_url: base_url.to_string(),
            database: None,
            session: SessionConfig {
                backend: SessionBackend::Memory,
                redis_url: None,
                ttl_hours: 8,
                cookie_secure: false,
            },
            invite_ttl_hours: crate::services::DEFAULT_INVITE_TTL_HOURS,
            password: PasswordParams {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
                ..PasswordParams::default()
            },
            totp_issuer: "Work Orders".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            post_login_path: "/app/work-orders".to_string(),
            default_signin_role: OrgRole::Member,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            oidc_providers: Vec::new(),
        }
    }

    /// Where the browser lands after a successful interactive sign-in.
    pub fn post_login_url(&self) -> String {
        format!(
            "{}{}",
            self.frontend_url.trim_end_matches('/'),
            self.post_login_path
        )
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.session.ttl_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_TTL_HOURS must be positive"
            )));
        }

        if self.invite_ttl_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "INVITE_TTL_HOURS must be positive"
            )));
        }

        if !self.default_signin_role.is_grantable() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DEFAULT_SIGNIN_ROLE cannot be Owner"
            )));
        }

        if self.session.backend == SessionBackend::Redis && self.session.redis_url.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REDIS_URL is required when SESSION_BACKEND=redis"
            )));
        }

        // Credentialed CORS cannot be combined with a wildcard origin.
        if self.allowed_origins.iter().any(|o| o == "*") {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ALLOWED_ORIGINS cannot contain '*'"
            )));
        }

        if self.environment == Environment::Prod {
            if self.database.is_none() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "DATABASE_URL is required in production"
                )));
            }

            if !self.session.cookie_secure {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "SESSION_COOKIE_SECURE must be true in production"
                )));
            }
        }

        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
