//! External identity providers.
//!
//! The core only depends on [`IdentityProvider`]: something that can send a
//! browser to an authorization page and turn the returned code into a
//! verified identity. [`OidcProvider`] is a generic authorization-code
//! client over the token and userinfo endpoints.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::ServiceError;
use crate::config::OidcProviderConfig;

/// Identity asserted by a provider after a successful code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
    pub groups: Vec<String>,
    /// Provider tenant the account belongs to, used for organization binding.
    pub tenant_id: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Authorization page URL carrying `state` and the PKCE `code_challenge`.
    fn authorize_url(&self, state: &str, code_challenge: &str) -> String;

    async fn exchange(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<VerifiedIdentity, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
    name: Option<String>,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

/// Group claims come either as an array of strings or a single string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GroupsClaim {
    Many(Vec<String>),
    One(String),
}

impl UserInfo {
    fn claim<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.extra
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

pub struct OidcProvider {
    config: OidcProviderConfig,
    redirect_uri: String,
    http: reqwest::Client,
}

impl OidcProvider {
    pub fn new(config: OidcProviderConfig, base_url: &str) -> Self {
        let redirect_uri = format!(
            "{}/auth/{}/callback",
            base_url.trim_end_matches('/'),
            config.name
        );
        Self {
            config,
            redirect_uri,
            http: reqwest::Client::new(),
        }
    }

    fn upstream_error(&self, stage: &str, detail: impl std::fmt::Display) -> ServiceError {
        tracing::error!(
            provider = %self.config.name,
            stage,
            error = %detail,
            "Identity provider call failed"
        );
        ServiceError::Provider(format!("{} {} failed", self.config.name, stage))
    }
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn authorize_url(&self, state: &str, code_challenge: &str) -> String {
        let separator = if self.config.auth_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
            self.config.auth_url,
            separator,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&self.config.scopes),
            urlencoding::encode(state),
            urlencoding::encode(code_challenge),
        )
    }

    async fn exchange(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<VerifiedIdentity, ServiceError> {
        let token_res = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code_verifier", code_verifier),
            ])
            .send()
            .await
            .map_err(|e| self.upstream_error("token exchange", e))?;

        if !token_res.status().is_success() {
            let status = token_res.status();
            return Err(self.upstream_error("token exchange", status));
        }

        let token: TokenResponse = token_res
            .json()
            .await
            .map_err(|e| self.upstream_error("token decode", e))?;

        let info: UserInfo = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| self.upstream_error("userinfo", e))?
            .json()
            .await
            .map_err(|e| self.upstream_error("userinfo decode", e))?;

        let groups = match info.claim::<GroupsClaim>(&self.config.groups_claim) {
            Some(GroupsClaim::Many(groups)) => groups,
            Some(GroupsClaim::One(group)) => vec![group],
            None => Vec::new(),
        };
        let tenant_id = info.claim::<String>(&self.config.tenant_claim);

        let email = info
            .email
            .clone()
            .ok_or_else(|| ServiceError::Provider("provider returned no email".to_string()))?;

        Ok(VerifiedIdentity {
            subject: info.sub,
            email,
            email_verified: info.email_verified.unwrap_or(false),
            name: info.name,
            groups,
            tenant_id,
        })
    }
}

/// Configured providers by lower-case name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &[OidcProviderConfig], base_url: &str) -> Self {
        configs.iter().fold(Self::new(), |registry, cfg| {
            registry.with_provider(Arc::new(OidcProvider::new(cfg.clone(), base_url)))
        })
    }

    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers
            .insert(provider.name().to_lowercase(), provider);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn IdentityProvider>, ServiceError> {
        self.providers
            .get(&name.to_lowercase())
            .cloned()
            .ok_or(ServiceError::UnknownProvider)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}
