use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

/// Read `key` from the environment.
///
/// A missing variable falls back to `default`; when there is no default the
/// variable is required and a `ConfigError` is returned.
pub fn get_env(key: &str, default: Option<&str>) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => match default {
            Some(def) => Ok(def.to_string()),
            None => Err(AppError::ConfigError(anyhow::anyhow!(
                "{} is required but not set",
                key
            ))),
        },
    }
}

/// Read an optional variable, treating an empty value as unset.
pub fn get_env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse `key`, falling back to `default` when unset.
pub fn get_env_parsed<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_env_opt(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e))
        }),
        None => Ok(default),
    }
}
