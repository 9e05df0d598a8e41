//! RFC 6238 time-based one-time passwords (HMAC-SHA1, 30 s step, 6 digits).

use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha1::Sha1;
use subtle::ConstantTimeEq;

type HmacSha1 = Hmac<Sha1>;

pub const TOTP_STEP_SECS: i64 = 30;
pub const TOTP_DIGITS: u32 = 6;
/// Adjacent steps accepted on each side of the current one.
pub const TOTP_SKEW_STEPS: i64 = 1;
/// 160-bit shared secret, the HMAC-SHA1 block-friendly size.
pub const TOTP_SECRET_BYTES: usize = 20;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

#[derive(Debug, thiserror::Error)]
pub enum TotpError {
    #[error("invalid TOTP secret encoding")]
    InvalidSecret,
}

/// Fresh random secret, base32 encoded without padding.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; TOTP_SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base32_encode(&bytes)
}

/// RFC 4648 base32, upper case, no padding.
pub fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// Lenient decode: case-insensitive, ignores spaces and trailing padding.
pub fn base32_decode(input: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for c in input.chars().filter(|c| !c.is_whitespace() && *c != '=') {
        let upper = c.to_ascii_uppercase() as u8;
        let value = BASE32_ALPHABET.iter().position(|&a| a == upper)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }
    Some(out)
}

/// RFC 4226 HOTP value for `counter`, truncated to `digits`.
pub fn hotp(key: &[u8], counter: u64, digits: u32) -> Result<u32, TotpError> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|_| TotpError::InvalidSecret)?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = ((digest[offset] as u32 & 0x7f) << 24)
        | ((digest[offset + 1] as u32) << 16)
        | ((digest[offset + 2] as u32) << 8)
        | (digest[offset + 3] as u32);

    Ok(binary % 10u32.pow(digits))
}

pub fn time_step(unix_secs: i64) -> i64 {
    unix_secs.div_euclid(TOTP_STEP_SECS)
}

/// Check `code` against the current step and its neighbours.
///
/// Returns the matching time step so callers can reject replays of the same
/// or an earlier step.
pub fn verify_code(secret_b32: &str, code: &str, unix_secs: i64) -> Result<Option<i64>, TotpError> {
    let key = base32_decode(secret_b32).ok_or(TotpError::InvalidSecret)?;
    if key.is_empty() {
        return Err(TotpError::InvalidSecret);
    }

    let code = code.trim();
    if code.len() != TOTP_DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(None);
    }

    let current = time_step(unix_secs);
    let mut matched = None;
    for step in (current - TOTP_SKEW_STEPS)..=(current + TOTP_SKEW_STEPS) {
        if step < 0 {
            continue;
        }
        let expected = format!(
            "{:0width$}",
            hotp(&key, step as u64, TOTP_DIGITS)?,
            width = TOTP_DIGITS as usize
        );
        if bool::from(expected.as_bytes().ct_eq(code.as_bytes())) {
            matched = Some(step);
        }
    }
    Ok(matched)
}

/// `otpauth://` URI understood by authenticator apps.
pub fn provisioning_uri(secret_b32: &str, issuer: &str, label: &str) -> String {
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
        urlencoding::encode(issuer),
        urlencoding::encode(label),
        secret_b32,
        urlencoding::encode(issuer),
        TOTP_DIGITS,
        TOTP_STEP_SECS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 appendix B, SHA1 key.
    const RFC_KEY: &[u8] = b"12345678901234567890";

    #[test]
    fn test_hotp_matches_rfc_6238_vectors() {
        assert_eq!(hotp(RFC_KEY, time_step(59) as u64, 8).unwrap(), 94287082);
        assert_eq!(hotp(RFC_KEY, time_step(1111111109) as u64, 8).unwrap(), 7081804);
        assert_eq!(hotp(RFC_KEY, time_step(1234567890) as u64, 8).unwrap(), 89005924);
    }

    #[test]
    fn test_base32_round_trip() {
        let encoded = base32_encode(RFC_KEY);
        assert_eq!(encoded, "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ");
        assert_eq!(base32_decode(&encoded).unwrap(), RFC_KEY);
        assert_eq!(base32_decode("gezd gnbv gy3t qojq").unwrap(), &RFC_KEY[..10]);
        assert!(base32_decode("not*base32").is_none());
    }

    #[test]
    fn test_verify_code_accepts_adjacent_steps() {
        let secret = base32_encode(RFC_KEY);
        assert_eq!(verify_code(&secret, "287082", 59).unwrap(), Some(1));
        // One step later still accepts step 1.
        assert_eq!(verify_code(&secret, "287082", 89).unwrap(), Some(1));
        // Two steps later does not.
        assert_eq!(verify_code(&secret, "287082", 120).unwrap(), None);
    }

    #[test]
    fn test_verify_code_rejects_malformed_codes() {
        let secret = base32_encode(RFC_KEY);
        assert_eq!(verify_code(&secret, "28708", 59).unwrap(), None);
        assert_eq!(verify_code(&secret, "28708a", 59).unwrap(), None);
        assert!(verify_code("", "287082", 59).is_err());
    }

    #[test]
    fn test_generated_secret_is_160_bits() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        assert_eq!(base32_decode(&secret).unwrap().len(), TOTP_SECRET_BYTES);
    }

    #[test]
    fn test_provisioning_uri() {
        let uri = provisioning_uri("ABC", "Work Orders", "a@x.com");
        assert!(uri.starts_with("otpauth://totp/Work%20Orders:a%40x.com?secret=ABC"));
        assert!(uri.contains("issuer=Work%20Orders"));
    }
}
