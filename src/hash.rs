//! Password hashing.
//!
//! Basic-mode credentials are stored as bcrypt hashes. Digest-mode
//! credentials are the RFC 2617 `HA1` value, `MD5(username:realm:password)`,
//! which is all a server needs to check a digest response. The two are not
//! interchangeable.

use crate::errors::HashError;

/// Fixed bcrypt cost.
pub const HASH_COST: u32 = 10;

const BCRYPT_PREFIXES: [&str; 3] = ["$2a$", "$2b$", "$2y$"];

/// Hash a plaintext password with bcrypt.
pub fn hash_password(plaintext: &str) -> Result<String, HashError> {
    Ok(bcrypt::hash(plaintext, HASH_COST)?)
}

/// Check a plaintext password against a bcrypt hash.
///
/// A malformed hash is treated as a mismatch.
pub fn verify_password(hashed: &str, plaintext: &str) -> bool {
    match bcrypt::verify(plaintext, hashed) {
        Ok(ok) => ok,
        Err(e) => {
            debug!("bcrypt verify failed: {e}");
            false
        }
    }
}

/// Does this value look like something `hash_password` produced?
///
/// Only sniffs the algorithm prefix. Not a security check.
pub fn looks_hashed(value: &str) -> bool {
    BCRYPT_PREFIXES.iter().any(|p| value.starts_with(p))
}

/// Lowercase hex MD5 of a string.
pub fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// `HA1 = MD5(username:realm:password)`.
pub fn digest_ha1(username: &str, realm: &str, password: &str) -> String {
    md5_hex(&format!("{username}:{realm}:{password}"))
}

/// Does this value look like a precomputed `HA1` (32 hex digits)?
pub fn looks_like_ha1(value: &str) -> bool {
    value.len() == 32 && value.bytes().all(|b| b.is_ascii_hexdigit())
}
