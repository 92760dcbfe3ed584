//! Database models for accounts.

use chrono::{DateTime, Utc};

use crate::api::models::users::{AuthProvider, Role, UserUpdate};
use crate::auth::tokens::{SingleUseToken, TokenPurpose};
use crate::types::UserId;

/// Digest and expiry of an outstanding single-use token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    /// Both columns must be set for a token to count as outstanding.
    pub fn from_columns(hash: Option<String>, expires_at: Option<DateTime<Utc>>) -> Option<Self> {
        Some(Self {
            hash: hash?,
            expires_at: expires_at?,
        })
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// A token to store against an account, replacing any outstanding one of the same purpose.
#[derive(Debug, Clone)]
pub struct PendingToken {
    pub purpose: TokenPurpose,
    pub stored: StoredToken,
}

impl From<&SingleUseToken> for PendingToken {
    fn from(token: &SingleUseToken) -> Self {
        Self {
            purpose: token.purpose,
            stored: StoredToken {
                hash: token.hash.clone(),
                expires_at: token.expires_at,
            },
        }
    }
}

/// What a successful token consumption does to the account, applied in the same
/// write that clears the token.
#[derive(Debug, Clone)]
pub enum Redemption {
    /// Email verification.
    MarkVerified,
    /// Password reset.
    SetPassword { password_hash: String },
    /// Invited-account setup: set the password, verify, and clear the first-login flag.
    CompleteSetup { password_hash: String },
}

/// Database request for creating a new account
#[derive(Debug, Clone)]
pub struct AccountCreateDBRequest {
    pub full_name: String,
    /// Already lowercased.
    pub email: String,
    pub phone_number: Option<String>,
    pub password_hash: Option<String>,
    pub role: Role,
    pub is_verified: bool,
    pub is_first_login: bool,
    pub agreed_to_terms: bool,
    pub profile_picture: Option<String>,
    pub auth_provider: AuthProvider,
    pub auth_provider_id: Option<String>,
    pub created_by: Option<UserId>,
    pub token: Option<PendingToken>,
}

/// Database request for updating an account. `None` leaves a column unchanged.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdateDBRequest {
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub profile_picture: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl From<UserUpdate> for AccountUpdateDBRequest {
    fn from(update: UserUpdate) -> Self {
        Self {
            full_name: update.full_name,
            phone_number: update.phone_number,
            profile_picture: update.profile_picture,
            role: update.role,
            is_active: update.is_active,
        }
    }
}

impl AccountUpdateDBRequest {
    pub fn deactivate() -> Self {
        Self {
            is_active: Some(false),
            ..Default::default()
        }
    }
}

/// Filter for listing accounts
#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub created_by: Option<UserId>,
    pub active_only: bool,
}

/// Database response for an account, including credential material.
///
/// Never serialized; API responses go through `UserResponse`.
#[derive(Debug, Clone)]
pub struct AccountDBResponse {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub password_hash: Option<String>,
    pub role: Role,
    pub is_verified: bool,
    pub is_active: bool,
    pub is_first_login: bool,
    pub agreed_to_terms: bool,
    pub profile_picture: Option<String>,
    pub auth_provider: AuthProvider,
    pub auth_provider_id: Option<String>,
    pub created_by: Option<UserId>,
    pub last_login: Option<DateTime<Utc>>,
    pub email_verification: Option<StoredToken>,
    pub password_reset: Option<StoredToken>,
    pub password_setup: Option<StoredToken>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountDBResponse {
    pub fn token(&self, purpose: TokenPurpose) -> Option<&StoredToken> {
        match purpose {
            TokenPurpose::EmailVerification => self.email_verification.as_ref(),
            TokenPurpose::PasswordReset => self.password_reset.as_ref(),
            TokenPurpose::PasswordSetup => self.password_setup.as_ref(),
        }
    }

    pub fn token_mut(&mut self, purpose: TokenPurpose) -> &mut Option<StoredToken> {
        match purpose {
            TokenPurpose::EmailVerification => &mut self.email_verification,
            TokenPurpose::PasswordReset => &mut self.password_reset,
            TokenPurpose::PasswordSetup => &mut self.password_setup,
        }
    }

    /// Apply a redemption in memory. Storage backends call this after clearing the token.
    pub fn redeem(&mut self, redemption: &Redemption, now: DateTime<Utc>) {
        match redemption {
            Redemption::MarkVerified => self.is_verified = true,
            Redemption::SetPassword { password_hash } => self.password_hash = Some(password_hash.clone()),
            Redemption::CompleteSetup { password_hash } => {
                self.password_hash = Some(password_hash.clone());
                self.is_verified = true;
                self.is_first_login = false;
            }
        }
        self.updated_at = now;
    }

    /// Apply a partial update in memory.
    pub fn apply(&mut self, update: &AccountUpdateDBRequest, now: DateTime<Utc>) {
        if let Some(full_name) = &update.full_name {
            self.full_name = full_name.clone();
        }
        if let Some(phone_number) = &update.phone_number {
            self.phone_number = Some(phone_number.clone());
        }
        if let Some(profile_picture) = &update.profile_picture {
            self.profile_picture = Some(profile_picture.clone());
        }
        if let Some(role) = update.role {
            self.role = role;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }
        self.updated_at = now;
    }
}
