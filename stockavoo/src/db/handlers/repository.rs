//! Repository traits for the storage boundary.
//!
//! A repository is the data access layer for one kind of record. Handlers and the account
//! lifecycle only ever see these traits, held as `Arc<dyn ...>` in application state, so the
//! Postgres implementations in this module's siblings and the in-memory implementation in
//! [`crate::db::memory`] are interchangeable.

use chrono::{DateTime, Utc};

use crate::api::models::users::AuthProvider;
use crate::auth::tokens::TokenPurpose;
use crate::db::errors::Result;
use crate::db::models::{
    accounts::{AccountCreateDBRequest, AccountDBResponse, AccountFilter, AccountUpdateDBRequest, PendingToken, Redemption},
    stores::{StoreCreateDBRequest, StoreDBResponse, StoreFilter, StoreUpdateDBRequest},
};
use crate::types::{StoreId, UserId};

/// Account storage.
///
/// Email lookups are case-insensitive and the email column is unique under case folding;
/// `create` reports a collision as [`crate::db::errors::DbError::UniqueViolation`] on the
/// email constraint.
#[async_trait::async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a new account, together with its first single-use token if one is given.
    async fn create(&self, request: &AccountCreateDBRequest) -> Result<AccountDBResponse>;

    async fn get_by_id(&self, id: UserId) -> Result<Option<AccountDBResponse>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<AccountDBResponse>>;

    /// Look up a federated account by the provider's subject id.
    async fn get_by_provider(&self, provider: AuthProvider, provider_id: &str) -> Result<Option<AccountDBResponse>>;

    /// Accounts matching the filter, newest first.
    async fn list(&self, filter: &AccountFilter) -> Result<Vec<AccountDBResponse>>;

    /// Apply a partial update. Fails with `NotFound` when the account does not exist.
    async fn update(&self, id: UserId, request: &AccountUpdateDBRequest) -> Result<AccountDBResponse>;

    /// Store a token digest and expiry, overwriting any outstanding token of the same purpose.
    async fn set_token(&self, id: UserId, token: &PendingToken) -> Result<()>;

    /// Atomically find the account whose `purpose` token has digest `hash` and has not expired
    /// at `now`, clear that token, and apply `redemption`.
    ///
    /// Returns `None` when no such token exists. Of any number of concurrent calls with the
    /// same digest, at most one returns `Some`.
    async fn consume_token(
        &self,
        purpose: TokenPurpose,
        hash: &str,
        now: DateTime<Utc>,
        redemption: &Redemption,
    ) -> Result<Option<AccountDBResponse>>;

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<()>;

    async fn set_password(&self, id: UserId, password_hash: &str) -> Result<()>;
}

/// Store storage.
#[async_trait::async_trait]
pub trait StoreRepository: Send + Sync {
    async fn create(&self, request: &StoreCreateDBRequest) -> Result<StoreDBResponse>;

    /// Fetch a store whether or not it is active.
    async fn get_by_id(&self, id: StoreId) -> Result<Option<StoreDBResponse>>;

    /// Stores matching the filter, newest first.
    async fn list(&self, filter: &StoreFilter) -> Result<Vec<StoreDBResponse>>;

    /// Apply a partial update. Fails with `NotFound` when the store does not exist.
    async fn update(&self, id: StoreId, request: &StoreUpdateDBRequest) -> Result<StoreDBResponse>;

    /// Soft delete. Returns false when the store does not exist.
    async fn deactivate(&self, id: StoreId) -> Result<bool>;
}
