//! API request/response models for authentication.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::users::UserResponse;
use super::validation::{
    FULL_NAME_RE, PHONE_RE, ValidatedRequest, trim_to_none, validate_password_strength,
};
use crate::errors::FieldError;

fn normalize_email(email: Option<String>) -> Option<String> {
    trim_to_none(email).map(|e| e.to_lowercase())
}

/// Self-registration of a business owner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(
        required(message = "Full name is required"),
        length(min = 2, max = 50, message = "Full name must be between 2 and 50 characters"),
        regex(path = *FULL_NAME_RE, message = "Full name can only contain letters and spaces")
    )]
    pub full_name: Option<String>,
    #[validate(
        required(message = "Email is required"),
        email(message = "Please provide a valid email address")
    )]
    pub email: Option<String>,
    #[validate(required(message = "Password is required"), custom(function = "validate_password_strength"))]
    pub password: Option<String>,
    #[validate(required(message = "Please confirm your password"))]
    pub confirm_password: Option<String>,
    #[validate(
        required(message = "Phone number is required"),
        regex(path = *PHONE_RE, message = "Please provide a valid phone number")
    )]
    pub phone_number: Option<String>,
    #[validate(required(message = "You must agree to the terms and conditions"))]
    pub agreed_to_terms: Option<bool>,
}

impl ValidatedRequest for RegisterRequest {
    const FIELDS: &'static [&'static str] = &[
        "full_name",
        "email",
        "password",
        "confirm_password",
        "phone_number",
        "agreed_to_terms",
    ];

    fn normalize(&mut self) {
        self.full_name = trim_to_none(self.full_name.take());
        self.email = normalize_email(self.email.take());
        self.phone_number = trim_to_none(self.phone_number.take());
    }

    fn extra_errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if let (Some(password), Some(confirm)) = (&self.password, &self.confirm_password)
            && password != confirm
        {
            errors.push(FieldError::new("confirmPassword", "Passwords do not match"));
        }
        if self.agreed_to_terms == Some(false) {
            errors.push(FieldError::new(
                "agreedToTerms",
                "You must agree to the terms and conditions to register",
            ));
        }
        errors
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(
        required(message = "Email is required"),
        email(message = "Please provide a valid email address")
    )]
    pub email: Option<String>,
    #[validate(required(message = "Password is required"))]
    pub password: Option<String>,
}

impl ValidatedRequest for LoginRequest {
    const FIELDS: &'static [&'static str] = &["email", "password"];

    fn normalize(&mut self) {
        self.email = normalize_email(self.email.take());
        self.password = self.password.take().filter(|p| !p.is_empty());
    }
}

/// Body carrying only an email: resend-verification and forgot-password.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    #[validate(
        required(message = "Email is required"),
        email(message = "Please provide a valid email address")
    )]
    pub email: Option<String>,
}

impl ValidatedRequest for EmailRequest {
    const FIELDS: &'static [&'static str] = &["email"];

    fn normalize(&mut self) {
        self.email = normalize_email(self.email.take());
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(required(message = "Password is required"), custom(function = "validate_password_strength"))]
    pub password: Option<String>,
    /// Optional; when present it must match `password`.
    pub confirm_password: Option<String>,
}

impl ValidatedRequest for ResetPasswordRequest {
    const FIELDS: &'static [&'static str] = &["password", "confirm_password"];

    fn extra_errors(&self) -> Vec<FieldError> {
        match (&self.password, &self.confirm_password) {
            (Some(password), Some(confirm)) if password != confirm => {
                vec![FieldError::new("confirmPassword", "Passwords do not match")]
            }
            _ => Vec::new(),
        }
    }
}

/// Invited-account setup. Only a minimum length is enforced, and that check happens
/// in the lifecycle so it precedes the token lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetupPasswordRequest {
    pub password: Option<String>,
}

impl ValidatedRequest for SetupPasswordRequest {
    const FIELDS: &'static [&'static str] = &["password"];
}

/// `{ user, token }` returned by every flow that logs the caller in.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthPayload {
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserPayload {
    pub user: UserResponse,
}

/// Success envelope for the auth endpoints: `{"status":"success","message":...,"data":...}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthEnvelope<T> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> AuthEnvelope<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn data(data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: None,
            data: Some(data),
        }
    }
}

/// Success envelope without data.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusMessage {
    pub status: String,
    pub message: String,
}

impl StatusMessage {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }
}

/// Query parameters on the OAuth provider callback.
#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    /// Echo of the `state` sent with the authorize redirect
    pub state: Option<String>,
}
