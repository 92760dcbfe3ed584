//! API request/response models for users.

use crate::db::models::accounts::AccountDBResponse;
use crate::errors::{Error, FieldError};
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use validator::Validate;

use super::validation::{
    FULL_NAME_RE, PHONE_RE, ValidatedRequest, trim_to_none, validate_password_strength,
};

/// Job function of an account. Closed set; the permission matrix has a row for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Manager,
    Clerk,
    Accountant,
    WarehouseManager,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Owner,
        Role::Manager,
        Role::Clerk,
        Role::Accountant,
        Role::WarehouseManager,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Manager => "manager",
            Role::Clerk => "clerk",
            Role::Accountant => "accountant",
            Role::WarehouseManager => "warehouse_manager",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Where an account's identity is asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Local,
    Google,
    Facebook,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Local => "local",
            AuthProvider::Google => "google",
            AuthProvider::Facebook => "facebook",
        }
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public view of an account. Password and token material never appear here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub role: Role,
    pub is_verified: bool,
    pub is_active: bool,
    pub is_first_login: bool,
    pub profile_picture: Option<String>,
    pub auth_provider: AuthProvider,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub created_by: Option<UserId>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccountDBResponse> for UserResponse {
    fn from(account: AccountDBResponse) -> Self {
        Self {
            id: account.id,
            full_name: account.full_name,
            email: account.email,
            phone_number: account.phone_number,
            role: account.role,
            is_verified: account.is_verified,
            is_active: account.is_active,
            is_first_login: account.is_first_login,
            profile_picture: account.profile_picture,
            auth_provider: account.auth_provider,
            created_by: account.created_by,
            last_login: account.last_login,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

/// Body of `POST /users`: an owner inviting a subordinate account.
///
/// `role` arrives as a string so that an unknown value is reported as a validation error
/// rather than a body parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserInvite {
    #[validate(
        length(min = 2, max = 50, message = "Full name must be between 2 and 50 characters"),
        regex(path = *FULL_NAME_RE, message = "Full name can only contain letters and spaces")
    )]
    pub full_name: Option<String>,
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: Option<String>,
    #[validate(regex(path = *PHONE_RE, message = "Please provide a valid phone number"))]
    pub phone_number: Option<String>,
    pub role: Option<String>,
}

impl ValidatedRequest for UserInvite {
    const FIELDS: &'static [&'static str] = &["full_name", "email", "phone_number", "role"];

    fn normalize(&mut self) {
        self.full_name = trim_to_none(self.full_name.take());
        self.email = trim_to_none(self.email.take()).map(|e| e.to_lowercase());
        self.phone_number = trim_to_none(self.phone_number.take());
        self.role = trim_to_none(self.role.take());
    }

    fn check(&self) -> Result<(), Error> {
        if self.full_name.is_none() || self.email.is_none() || self.phone_number.is_none() || self.role.is_none() {
            return Err(missing_invite_fields());
        }
        match self.role.as_deref().map(Role::from_str) {
            Some(Err(e)) => Err(unknown_role(e)),
            _ => Ok(()),
        }
    }
}

fn missing_invite_fields() -> Error {
    Error::BadRequest {
        message: "Please provide all required fields: fullName, email, phoneNumber, role".to_string(),
    }
}

fn unknown_role(e: UnknownRole) -> Error {
    Error::ValidationFailed {
        errors: vec![FieldError::new(
            "role",
            format!("Invalid role '{}'. Must be one of: owner, manager, clerk, accountant, warehouse_manager", e.0),
        )],
    }
}

/// Validated invite with the role parsed.
#[derive(Debug, Clone)]
pub struct InviteUser {
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub role: Role,
}

impl TryFrom<UserInvite> for InviteUser {
    type Error = Error;

    fn try_from(body: UserInvite) -> Result<Self, Self::Error> {
        let role = body.role.as_deref().ok_or_else(missing_invite_fields)?;
        let role = Role::from_str(role).map_err(unknown_role)?;
        Ok(Self {
            full_name: body.full_name.ok_or_else(missing_invite_fields)?,
            email: body.email.ok_or_else(missing_invite_fields)?,
            phone_number: body.phone_number.ok_or_else(missing_invite_fields)?,
            role,
        })
    }
}

/// Body of `PUT /users/{id}`. `role` and `isActive` are owner-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[validate(
        length(min = 2, max = 50, message = "Full name must be between 2 and 50 characters"),
        regex(path = *FULL_NAME_RE, message = "Full name can only contain letters and spaces")
    )]
    pub full_name: Option<String>,
    #[validate(regex(path = *PHONE_RE, message = "Please provide a valid phone number"))]
    pub phone_number: Option<String>,
    pub profile_picture: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl ValidatedRequest for UserUpdate {
    const FIELDS: &'static [&'static str] = &["full_name", "phone_number", "profile_picture"];

    fn normalize(&mut self) {
        self.full_name = trim_to_none(self.full_name.take());
        self.phone_number = trim_to_none(self.phone_number.take());
        self.profile_picture = trim_to_none(self.profile_picture.take());
    }
}

/// Body of `PUT /users/me`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[validate(
        length(min = 2, max = 50, message = "Full name must be between 2 and 50 characters"),
        regex(path = *FULL_NAME_RE, message = "Full name can only contain letters and spaces")
    )]
    pub full_name: Option<String>,
    #[validate(regex(path = *PHONE_RE, message = "Please provide a valid phone number"))]
    pub phone_number: Option<String>,
    pub profile_picture: Option<String>,
}

impl ValidatedRequest for ProfileUpdate {
    const FIELDS: &'static [&'static str] = &["full_name", "phone_number", "profile_picture"];

    fn normalize(&mut self) {
        self.full_name = trim_to_none(self.full_name.take());
        self.phone_number = trim_to_none(self.phone_number.take());
        self.profile_picture = trim_to_none(self.profile_picture.take());
    }
}

/// Body of `PUT /users/me/password`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePassword {
    #[validate(required(message = "Current password is required"))]
    pub current_password: Option<String>,
    #[validate(
        required(message = "New password is required"),
        custom(function = "validate_password_strength")
    )]
    pub new_password: Option<String>,
}

impl ValidatedRequest for ChangePassword {
    const FIELDS: &'static [&'static str] = &["current_password", "new_password"];
}
