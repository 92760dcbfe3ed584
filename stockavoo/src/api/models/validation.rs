//! Request body validation.
//!
//! Request structs deserialize every user-supplied field as an `Option` so that a missing
//! field is reported with its own message instead of failing JSON deserialization. Rules are
//! declared with the `validator` derive; [`ValidatedJson`] runs normalization and validation
//! before the handler sees the body and reports at most one message per field.

use std::borrow::Cow;
use std::sync::LazyLock;

use axum::{
    Json,
    extract::{FromRequest, Request},
};
use regex::Regex;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::errors::{Error, FieldError};

pub static FULL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z\s]+$").expect("valid regex"));
pub static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[+]?[\d\s()-]{10,}$").expect("valid regex"));

static UPPERCASE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z]").expect("valid regex"));
static LOWERCASE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z]").expect("valid regex"));
static DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").expect("valid regex"));
static SYMBOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[!@#$%^&*()_+\-=\[\]{};':"\\|,.<>/?]"#).expect("valid regex"));

pub const PASSWORD_MIN_LENGTH: usize = 8;

fn rule(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

/// Strength rules for a new password. Reports the first rule that fails.
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        return Err(rule("password_length", "Password must be at least 8 characters long"));
    }
    if !UPPERCASE_RE.is_match(password) {
        return Err(rule("password_uppercase", "Password must contain at least 1 uppercase letter"));
    }
    if !LOWERCASE_RE.is_match(password) {
        return Err(rule("password_lowercase", "Password must contain at least 1 lowercase letter"));
    }
    if !DIGIT_RE.is_match(password) {
        return Err(rule("password_digit", "Password must contain at least 1 number"));
    }
    if !SYMBOL_RE.is_match(password) {
        return Err(rule(
            "password_symbol",
            "Password must contain at least 1 symbol (!@#$%^&*()_+-=[]{};'\":|,.<>?/)",
        ));
    }
    Ok(())
}

/// Trim a string field, treating whitespace-only input as absent.
pub fn trim_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Flatten `validator` errors into one message per field, in declaration order.
///
/// A missing field reports its `required` message even if other rules also failed.
pub fn field_errors(errors: &ValidationErrors, order: &[&str]) -> Vec<FieldError> {
    let by_field = errors.field_errors();
    let mut names: Vec<&str> = by_field.keys().map(|k| k.as_ref()).collect();
    names.sort_by_key(|name| order.iter().position(|o| o == name).unwrap_or(usize::MAX));

    names
        .into_iter()
        .filter_map(|name| {
            let errs = by_field.get(name)?;
            let chosen = errs.iter().find(|e| e.code == "required").or_else(|| errs.first())?;
            let message = chosen
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("Invalid value for {}", camel_case(name)));
            Some(FieldError::new(camel_case(name), message))
        })
        .collect()
}

/// A request body with normalization and validation rules.
pub trait ValidatedRequest: Validate {
    /// Field names in the order their errors should be reported.
    const FIELDS: &'static [&'static str];

    /// Trim and case-fold before validation.
    fn normalize(&mut self) {}

    /// Request-level rejection that short-circuits field validation.
    fn check(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Rules the derive cannot express, such as comparing two fields.
    fn extra_errors(&self) -> Vec<FieldError> {
        Vec::new()
    }

    fn validated(mut self) -> Result<Self, Error>
    where
        Self: Sized,
    {
        self.normalize();
        self.check()?;

        let mut errors = match self.validate() {
            Ok(()) => Vec::new(),
            Err(e) => field_errors(&e, Self::FIELDS),
        };
        for extra in self.extra_errors() {
            if !errors.iter().any(|e| e.field == extra.field) {
                errors.push(extra);
            }
        }
        if errors.is_empty() {
            return Ok(self);
        }

        errors.sort_by_key(|e| {
            Self::FIELDS
                .iter()
                .position(|f| camel_case(f) == e.field)
                .unwrap_or(usize::MAX)
        });
        Err(Error::ValidationFailed { errors })
    }
}

/// JSON body extractor that normalizes and validates before the handler runs.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + ValidatedRequest,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(body) = Json::<T>::from_request(req, state).await.map_err(|rejection| Error::BadRequest {
            message: rejection.body_text(),
        })?;
        Ok(Self(body.validated()?))
    }
}
