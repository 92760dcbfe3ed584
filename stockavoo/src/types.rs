//! Common type definitions and access-control vocabulary.
//!
//! This module defines:
//! - Type aliases for entity IDs ([`UserId`], [`StoreId`])
//! - [`Resource`]: what kind of entity an action targets
//! - [`Action`]: what is being done to it
//!
//! The role-to-permission matrix that combines these lives in
//! [`crate::auth::permissions`].

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type StoreId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Resources guarded by the permission matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Users,
    Stores,
    Products,
    Sales,
    Suppliers,
    Expenses,
    Reports,
    Settings,
    Subscription,
}

/// Actions that can be granted on a [`Resource`].
///
/// `Refund` and `Export` only appear on sales and reports respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Refund,
    Export,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Users => "users",
            Resource::Stores => "stores",
            Resource::Products => "products",
            Resource::Sales => "sales",
            Resource::Suppliers => "suppliers",
            Resource::Expenses => "expenses",
            Resource::Reports => "reports",
            Resource::Settings => "settings",
            Resource::Subscription => "subscription",
        }
    }
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Refund => "refund",
            Action::Export => "export",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }

    #[test]
    fn test_display_matches_wire_format() {
        assert_eq!(Resource::Subscription.to_string(), "subscription");
        assert_eq!(Action::Export.to_string(), "export");
        assert_eq!(serde_json::to_string(&Resource::Users).unwrap(), "\"users\"");
        assert_eq!(serde_json::to_string(&Action::Refund).unwrap(), "\"refund\"");
    }
}
