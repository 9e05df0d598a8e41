use service_core::error::AppError;
use thiserror::Error;

use crate::utils::PasswordError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Second factor required")]
    SecondFactorRequired,

    #[error("Forbidden")]
    Forbidden,

    #[error("Invite email mismatch")]
    EmailMismatch,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Identity already linked to another user")]
    IdentityConflict,

    #[error("Invalid invite")]
    InvalidInvite,

    #[error("Invite expired or used")]
    InviteExpiredOrUsed,

    #[error("Invalid role")]
    InvalidRole,

    #[error("Weak password")]
    WeakPassword,

    #[error("TOTP already enrolled")]
    TotpAlreadyEnrolled,

    #[error("TOTP not enrolled")]
    TotpNotEnrolled,

    #[error("Invalid TOTP code")]
    InvalidTotpCode,

    #[error("Email not verified")]
    EmailNotVerified,

    #[error("Unknown identity provider")]
    UnknownProvider,

    #[error("Invalid OAuth state")]
    InvalidOAuthState,

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<PasswordError> for ServiceError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooShort => ServiceError::WeakPassword,
            other => ServiceError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Redis(e) => AppError::RedisError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::Unauthenticated => AppError::unauthorized(),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid email or password"))
            }
            ServiceError::SecondFactorRequired => {
                AppError::Unauthorized(anyhow::anyhow!("Second factor required"))
            }
            ServiceError::Forbidden | ServiceError::EmailMismatch => AppError::forbidden(),
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::IdentityConflict => {
                AppError::Conflict(anyhow::anyhow!("Identity already linked to another user"))
            }
            ServiceError::InvalidInvite => AppError::BadRequest(anyhow::anyhow!("invalid invite")),
            ServiceError::InviteExpiredOrUsed => {
                AppError::Conflict(anyhow::anyhow!("invite expired or used"))
            }
            ServiceError::InvalidRole => AppError::BadRequest(anyhow::anyhow!("invalid role")),
            ServiceError::WeakPassword => AppError::BadRequest(anyhow::anyhow!(
                "password must be at least 8 characters"
            )),
            ServiceError::TotpAlreadyEnrolled => {
                AppError::Conflict(anyhow::anyhow!("TOTP already enrolled"))
            }
            ServiceError::TotpNotEnrolled => {
                AppError::BadRequest(anyhow::anyhow!("TOTP setup not started"))
            }
            ServiceError::InvalidTotpCode => AppError::BadRequest(anyhow::anyhow!("invalid code")),
            ServiceError::EmailNotVerified => {
                AppError::Forbidden(anyhow::anyhow!("Email not verified"))
            }
            ServiceError::UnknownProvider => {
                AppError::NotFound(anyhow::anyhow!("Unknown identity provider"))
            }
            ServiceError::InvalidOAuthState => {
                AppError::BadRequest(anyhow::anyhow!("Invalid OAuth state"))
            }
            ServiceError::Provider(e) => AppError::BadGateway(e),
            ServiceError::Validation(e) => AppError::BadRequest(anyhow::anyhow!(e)),
        }
    }
}
