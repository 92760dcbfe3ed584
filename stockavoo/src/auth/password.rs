//! Password hashing and verification, plus the unsalted digest used for single-use tokens.

use std::sync::OnceLock;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sha2::{Digest, Sha256};

use crate::config::PasswordConfig;
use crate::errors::Error;

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    fn to_argon2(self) -> Result<Argon2<'static>, Error> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| Error::Internal {
            operation: format!("create argon2 params: {e}"),
        })?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for Argon2Params {
    /// Secure defaults for production (Argon2id RFC recommendations)
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MB
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl From<&PasswordConfig> for Argon2Params {
    fn from(config: &PasswordConfig) -> Self {
        Self {
            memory_kib: config.argon2_memory_kib,
            iterations: config.argon2_iterations,
            parallelism: config.argon2_parallelism,
        }
    }
}

/// Hash a password with a fresh random salt. Two calls on the same input never agree.
pub fn hash_string_with_params(input: &str, params: Argon2Params) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = params
        .to_argon2()?
        .hash_password(input.as_bytes(), &salt)
        .map_err(|e| Error::Internal {
            operation: format!("hash string: {e}"),
        })?;

    Ok(hash.to_string())
}

/// Verify a string against a PHC hash string.
///
/// Verification uses the parameters embedded in the hash itself, so changing the configured
/// cost does not invalidate stored passwords.
pub fn verify_string(input: &str, hash: &str) -> Result<bool, Error> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::Internal {
        operation: format!("parse hash: {e}"),
    })?;

    Ok(Argon2::default().verify_password(input.as_bytes(), &parsed_hash).is_ok())
}

/// Hash on the blocking pool. Argon2 is deliberately slow and must not stall the runtime.
pub async fn hash_password(password: String, params: Argon2Params) -> Result<String, Error> {
    tokio::task::spawn_blocking(move || hash_string_with_params(&password, params))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password hashing task: {e}"),
        })?
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, Error> {
    tokio::task::spawn_blocking(move || verify_string(&password, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })?
}

pub(super) static DUMMY_HASH: OnceLock<String> = OnceLock::new();

/// Run a full verification against a throwaway hash and discard the result.
///
/// Login calls this when there is no stored hash to check, so unknown emails and
/// passwordless accounts take as long to reject as a wrong password.
pub async fn verify_dummy_password(password: String, params: Argon2Params) -> Result<(), Error> {
    tokio::task::spawn_blocking(move || {
        let hash = match DUMMY_HASH.get() {
            Some(hash) => hash,
            None => {
                let hash = hash_string_with_params("stockavoo-unused-credential", params)?;
                DUMMY_HASH.get_or_init(|| hash)
            }
        };
        verify_string(&password, hash).map(|_| ())
    })
    .await
    .map_err(|e| Error::Internal {
        operation: format!("spawn password verification task: {e}"),
    })?
}

/// Deterministic hex-encoded SHA-256 of a raw single-use token.
///
/// Tokens are looked up by this digest, so it carries no salt.
pub fn hash_opaque_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}
