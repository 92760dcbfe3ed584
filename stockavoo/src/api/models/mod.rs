//! API request and response data models.
//!
//! These types define the public JSON contract and are kept apart from the database
//! records in [`crate::db::models`], so that hashes and token material never reach a
//! serializer.
//!
//! - [`auth`]: registration, login and single-use token flows
//! - [`users`]: roles, account views, invites and profile updates
//! - [`stores`]: store records and bulk import
//! - [`validation`]: the [`validation::ValidatedJson`] extractor and shared field rules
//!
//! Auth endpoints answer with `{"status":"success",...}`; the user and store resources
//! answer with `{"success":true,...}` via [`ApiResponse`].

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod auth;
pub mod stores;
pub mod users;
pub mod validation;

/// Envelope for the user and store resources.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            message: None,
            count: None,
            data: Some(data),
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            count: None,
            data: Some(data),
        }
    }
}

impl<T> ApiResponse<Vec<T>> {
    pub fn list(items: Vec<T>) -> Self {
        Self {
            success: true,
            message: None,
            count: Some(items.len()),
            data: Some(items),
        }
    }
}

/// `{"success":true,"message":...}` with no data.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SuccessMessage {
    pub success: bool,
    pub message: String,
}

impl SuccessMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_envelope_counts_items() {
        let body = serde_json::to_value(ApiResponse::list(vec![1, 2, 3])).unwrap();
        assert_eq!(body, json!({"success": true, "count": 3, "data": [1, 2, 3]}));
    }

    #[test]
    fn test_message_envelope() {
        let body = serde_json::to_value(SuccessMessage::new("User deactivated successfully")).unwrap();
        assert_eq!(body, json!({"success": true, "message": "User deactivated successfully"}));
    }
}
