//! Local password hashing with Argon2id in PHC string format.
//!
//! The encoded hash carries algorithm, version, cost parameters and salt, so
//! verification never consults configuration and keeps working for hashes
//! produced under older parameter sets.

use argon2::{
    password_hash::{
        rand_core::{OsRng, RngCore},
        PasswordHash, PasswordHasher, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use subtle::ConstantTimeEq;

/// Fast-path rejection length. Not a substitute for hashing cost.
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password must be at least 8 characters")]
    TooShort,

    #[error("failed to hash password: {0}")]
    Hashing(String),

    #[error("malformed password hash: {0}")]
    MalformedHash(String),
}

/// Argon2id cost parameters used for new hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub salt_len: usize,
    pub key_len: usize,
}

impl Default for PasswordParams {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
            salt_len: 16,
            key_len: 32,
        }
    }
}

impl PasswordParams {
    fn argon2(&self) -> Result<Argon2<'static>, PasswordError> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(self.key_len),
        )
        .map_err(|e| PasswordError::Hashing(e.to_string()))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Newtype for an encoded PHC hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

pub fn check_password_policy(password: &Password) -> Result<(), PasswordError> {
    if password.as_str().chars().count() < MIN_PASSWORD_LEN {
        return Err(PasswordError::TooShort);
    }
    Ok(())
}

/// Hash a password with a fresh random salt of `params.salt_len` bytes.
pub fn hash_password(
    password: &Password,
    params: &PasswordParams,
) -> Result<PasswordHashString, PasswordError> {
    let mut salt_bytes = vec![0u8; params.salt_len];
    OsRng.fill_bytes(&mut salt_bytes);
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|e| PasswordError::Hashing(e.to_string()))?;

    let hash = params
        .argon2()?
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| PasswordError::Hashing(e.to_string()))?
        .to_string();

    Ok(PasswordHashString::new(hash))
}

/// Verify a password against an encoded hash.
///
/// Re-derives the key with the parameters embedded in the hash and compares
/// it in constant time. `Ok(false)` is a mismatch; `Err` means the stored
/// hash could not be interpreted.
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<bool, PasswordError> {
    let malformed = |e: &dyn std::fmt::Display| PasswordError::MalformedHash(e.to_string());

    let parsed = PasswordHash::new(password_hash.as_str()).map_err(|e| malformed(&e))?;
    let algorithm = Algorithm::try_from(parsed.algorithm).map_err(|e| malformed(&e))?;
    let version = match parsed.version {
        Some(v) => Version::try_from(v).map_err(|e| malformed(&e))?,
        None => Version::default(),
    };
    let params = Params::try_from(&parsed).map_err(|e| malformed(&e))?;

    let expected = parsed
        .hash
        .ok_or_else(|| PasswordError::MalformedHash("missing hash output".to_string()))?;
    let salt = parsed
        .salt
        .ok_or_else(|| PasswordError::MalformedHash("missing salt".to_string()))?;
    let mut salt_buf = [0u8; 64];
    let salt_bytes = salt.decode_b64(&mut salt_buf).map_err(|e| malformed(&e))?;

    let mut derived = vec![0u8; expected.len()];
    Argon2::new(algorithm, version, params)
        .hash_password_into(password.as_str().as_bytes(), salt_bytes, &mut derived)
        .map_err(|e| PasswordError::Hashing(e.to_string()))?;

    Ok(derived.ct_eq(expected.as_bytes()).into())
}

/// True when `password_hash` was produced with parameters other than `params`.
pub fn needs_rehash(password_hash: &PasswordHashString, params: &PasswordParams) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash.as_str()) else {
        return true;
    };
    let Ok(stored) = Params::try_from(&parsed) else {
        return true;
    };

    !matches!(Algorithm::try_from(parsed.algorithm), Ok(Algorithm::Argon2id))
        || stored.m_cost() != params.memory_kib
        || stored.t_cost() != params.iterations
        || stored.p_cost() != params.parallelism
        || parsed.hash.map(|h| h.len()) != Some(params.key_len)
}
