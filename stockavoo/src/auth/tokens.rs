//! Single-use tokens mailed for email verification, password reset and invited-account setup.
//!
//! The raw value only ever leaves the process inside an email link. Storage keeps the hex
//! SHA-256 digest and an expiry, one pair per purpose.

use chrono::{DateTime, Utc};
use rand::prelude::RngExt;
use rand::rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::password::hash_opaque_token;
use crate::config::TokenLifetimes;

/// Number of random bytes in a raw token, before hex encoding.
pub const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
    PasswordSetup,
}

impl TokenPurpose {
    pub fn lifetime(self, lifetimes: &TokenLifetimes) -> std::time::Duration {
        match self {
            TokenPurpose::EmailVerification => lifetimes.email_verification,
            TokenPurpose::PasswordReset => lifetimes.password_reset,
            TokenPurpose::PasswordSetup => lifetimes.password_setup,
        }
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenPurpose::EmailVerification => "email_verification",
            TokenPurpose::PasswordReset => "password_reset",
            TokenPurpose::PasswordSetup => "password_setup",
        })
    }
}

/// A freshly generated token. `raw` goes in the email, `hash` and `expires_at` go to storage.
#[derive(Clone)]
pub struct SingleUseToken {
    pub purpose: TokenPurpose,
    pub raw: String,
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for SingleUseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleUseToken")
            .field("purpose", &self.purpose)
            .field("raw", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl SingleUseToken {
    pub fn generate(purpose: TokenPurpose, lifetimes: &TokenLifetimes) -> Self {
        Self::generate_at(purpose, lifetimes, Utc::now())
    }

    pub fn generate_at(purpose: TokenPurpose, lifetimes: &TokenLifetimes, now: DateTime<Utc>) -> Self {
        let raw = generate_raw_token();
        let hash = hash_opaque_token(&raw);
        Self {
            purpose,
            raw,
            hash,
            expires_at: now + purpose.lifetime(lifetimes),
        }
    }
}

/// 32 bytes from the thread-local CSPRNG, hex encoded for use in a URL path.
pub fn generate_raw_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rng().fill(&mut bytes);
    hex::encode(bytes)
}
