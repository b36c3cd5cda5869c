//! Credential hashing and verification using Argon2id.
//!
//! Hashes use OWASP-recommended parameters (memory: 19 MiB, iterations: 2,
//! parallelism: 1) with a random salt per hash. An optional pepper is
//! prepended to the secret on both sides.

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};

use crate::error::SyncError;

fn peppered(secret: &str, pepper: Option<&str>) -> Vec<u8> {
    match pepper {
        Some(p) => format!("{p}{secret}").into_bytes(),
        None => secret.as_bytes().to_vec(),
    }
}

/// Hash a secret into an Argon2id PHC string.
pub fn hash_secret(secret: &str, pepper: Option<&str>) -> Result<String, SyncError> {
    let params = argon2::Params::new(19456, 2, 1, None)
        .map_err(|e| SyncError::Credential(format!("argon2 params error: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(&peppered(secret, pepper), &salt)
        .map_err(|e| SyncError::Credential(format!("hash error: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a secret against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch and an error only when the stored hash
/// is malformed.
pub fn verify_secret(secret: &str, hash: &str, pepper: Option<&str>) -> Result<bool, SyncError> {
    let parsed = argon2::PasswordHash::new(hash)
        .map_err(|e| SyncError::Credential(format!("invalid hash format: {e}")))?;

    match Argon2::default().verify_password(&peppered(secret, pepper), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(SyncError::Credential(format!("verify error: {e}"))),
    }
}
