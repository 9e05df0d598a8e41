pub mod password;
pub mod request;
pub mod token;
pub mod totp;
pub mod validation;

pub use password::{
    check_password_policy, hash_password, needs_rehash, verify_password, Password,
    PasswordError, PasswordHashString, PasswordParams, MIN_PASSWORD_LEN,
};
pub use token::{generate_secure_token, hash_token, pkce_challenge};
pub use validation::ValidatedJson;
