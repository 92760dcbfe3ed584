//! Process-local storage backed by `dashmap`.
//!
//! Used when no external database is configured, and by the test suite. Data lives only as
//! long as the process. The guarantees the repository traits promise still hold: the email
//! index gives case-insensitive uniqueness, and token consumption re-checks the digest and
//! expiry while holding the account's entry lock, so a token can only be redeemed once.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use tracing::instrument;
use uuid::Uuid;

use crate::api::models::users::AuthProvider;
use crate::auth::tokens::TokenPurpose;
use crate::db::errors::{DbError, Result};
use crate::db::handlers::repository::{AccountRepository, StoreRepository};
use crate::db::models::{
    accounts::{AccountCreateDBRequest, AccountDBResponse, AccountFilter, AccountUpdateDBRequest, PendingToken, Redemption},
    stores::{StoreCreateDBRequest, StoreDBResponse, StoreFilter, StoreUpdateDBRequest},
};
use crate::types::{StoreId, UserId, abbrev_uuid};

const EMAIL_CONSTRAINT: &str = "accounts_email_lower_key";
const PROVIDER_CONSTRAINT: &str = "accounts_provider_subject_key";

/// A stored record plus its insertion sequence, used to break ties in newest-first listings.
#[derive(Debug, Clone)]
struct Row<T> {
    seq: u64,
    record: T,
}

#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    accounts: DashMap<UserId, Row<AccountDBResponse>>,
    /// Lowercased email to account id.
    emails: DashMap<String, UserId>,
    stores: DashMap<StoreId, Row<StoreDBResponse>>,
    seq: AtomicU64,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn unique_violation(constraint: &str, message: String) -> DbError {
        DbError::UniqueViolation {
            constraint: Some(constraint.to_string()),
            table: Some("accounts".to_string()),
            message,
        }
    }

    fn find_account(&self, predicate: impl Fn(&AccountDBResponse) -> bool) -> Option<UserId> {
        self.accounts
            .iter()
            .find(|entry| predicate(&entry.value().record))
            .map(|entry| *entry.key())
    }
}

fn newest_first<T: Clone>(mut rows: Vec<Row<T>>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    rows.sort_by(|a, b| {
        created_at(&b.record)
            .cmp(&created_at(&a.record))
            .then(b.seq.cmp(&a.seq))
    });
    rows.into_iter().map(|row| row.record).collect()
}

#[async_trait::async_trait]
impl AccountRepository for InMemoryDatabase {
    #[instrument(skip(self, request), fields(role = %request.role, provider = %request.auth_provider), err)]
    async fn create(&self, request: &AccountCreateDBRequest) -> Result<AccountDBResponse> {
        if let Some(provider_id) = &request.auth_provider_id {
            let taken = self.find_account(|a| {
                a.auth_provider == request.auth_provider && a.auth_provider_id.as_deref() == Some(provider_id.as_str())
            });
            if taken.is_some() {
                return Err(Self::unique_violation(
                    PROVIDER_CONSTRAINT,
                    format!("provider subject already linked: {}", request.auth_provider),
                ));
            }
        }

        match self.emails.entry(request.email.to_lowercase()) {
            Entry::Occupied(_) => Err(Self::unique_violation(
                EMAIL_CONSTRAINT,
                "duplicate key value violates unique constraint on lower(email)".to_string(),
            )),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let mut account = AccountDBResponse {
                    id: Uuid::new_v4(),
                    full_name: request.full_name.clone(),
                    email: request.email.clone(),
                    phone_number: request.phone_number.clone(),
                    password_hash: request.password_hash.clone(),
                    role: request.role,
                    is_verified: request.is_verified,
                    is_active: true,
                    is_first_login: request.is_first_login,
                    agreed_to_terms: request.agreed_to_terms,
                    profile_picture: request.profile_picture.clone(),
                    auth_provider: request.auth_provider,
                    auth_provider_id: request.auth_provider_id.clone(),
                    created_by: request.created_by,
                    last_login: None,
                    email_verification: None,
                    password_reset: None,
                    password_setup: None,
                    created_at: now,
                    updated_at: now,
                };
                if let Some(token) = &request.token {
                    *account.token_mut(token.purpose) = Some(token.stored.clone());
                }

                self.accounts.insert(
                    account.id,
                    Row {
                        seq: self.next_seq(),
                        record: account.clone(),
                    },
                );
                slot.insert(account.id);
                Ok(account)
            }
        }
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&self, id: UserId) -> Result<Option<AccountDBResponse>> {
        Ok(self.accounts.get(&id).map(|row| row.record.clone()))
    }

    #[instrument(skip(self, email), err)]
    async fn get_by_email(&self, email: &str) -> Result<Option<AccountDBResponse>> {
        let Some(id) = self.emails.get(&email.to_lowercase()).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.accounts.get(&id).map(|row| row.record.clone()))
    }

    #[instrument(skip(self, provider_id), fields(provider = %provider), err)]
    async fn get_by_provider(&self, provider: AuthProvider, provider_id: &str) -> Result<Option<AccountDBResponse>> {
        let found = self.find_account(|a| a.auth_provider == provider && a.auth_provider_id.as_deref() == Some(provider_id));
        Ok(found.and_then(|id| self.accounts.get(&id).map(|row| row.record.clone())))
    }

    #[instrument(skip(self, filter), fields(active_only = filter.active_only), err)]
    async fn list(&self, filter: &AccountFilter) -> Result<Vec<AccountDBResponse>> {
        let rows: Vec<_> = self
            .accounts
            .iter()
            .filter(|entry| {
                let account = &entry.value().record;
                filter.created_by.is_none_or(|creator| account.created_by == Some(creator))
                    && (!filter.active_only || account.is_active)
            })
            .map(|entry| entry.value().clone())
            .collect();

        Ok(newest_first(rows, |a| a.created_at))
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&self, id: UserId, request: &AccountUpdateDBRequest) -> Result<AccountDBResponse> {
        let mut row = self.accounts.get_mut(&id).ok_or(DbError::NotFound)?;
        row.record.apply(request, Utc::now());
        Ok(row.record.clone())
    }

    #[instrument(skip(self, token), fields(user_id = %abbrev_uuid(&id), purpose = %token.purpose), err)]
    async fn set_token(&self, id: UserId, token: &PendingToken) -> Result<()> {
        let mut row = self.accounts.get_mut(&id).ok_or(DbError::NotFound)?;
        *row.record.token_mut(token.purpose) = Some(token.stored.clone());
        row.record.updated_at = Utc::now();
        Ok(())
    }

    #[instrument(skip(self, hash, redemption), fields(purpose = %purpose), err)]
    async fn consume_token(
        &self,
        purpose: TokenPurpose,
        hash: &str,
        now: DateTime<Utc>,
        redemption: &Redemption,
    ) -> Result<Option<AccountDBResponse>> {
        let matches = |account: &AccountDBResponse| {
            account
                .token(purpose)
                .is_some_and(|token| token.hash == hash && token.is_live(now))
        };

        // The scan holds shard read locks, so it must finish before taking the write lock.
        let Some(id) = self.find_account(&matches) else {
            return Ok(None);
        };
        let Some(mut row) = self.accounts.get_mut(&id) else {
            return Ok(None);
        };

        // Another caller may have redeemed the token between the scan and the lock.
        if !matches(&row.record) {
            return Ok(None);
        }
        *row.record.token_mut(purpose) = None;
        row.record.redeem(redemption, now);
        Ok(Some(row.record.clone()))
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut row) = self.accounts.get_mut(&id) {
            row.record.last_login = Some(at);
        }
        Ok(())
    }

    #[instrument(skip(self, password_hash), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn set_password(&self, id: UserId, password_hash: &str) -> Result<()> {
        let mut row = self.accounts.get_mut(&id).ok_or(DbError::NotFound)?;
        row.record.password_hash = Some(password_hash.to_string());
        row.record.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait::async_trait]
impl StoreRepository for InMemoryDatabase {
    #[instrument(skip(self, request), fields(created_by = %abbrev_uuid(&request.created_by)), err)]
    async fn create(&self, request: &StoreCreateDBRequest) -> Result<StoreDBResponse> {
        let now = Utc::now();
        let store = StoreDBResponse {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            email: request.email.clone(),
            phone_number: request.phone_number.clone(),
            address: request.address.clone(),
            currency: request.currency,
            tax_rate: request.tax_rate,
            is_active: true,
            created_by: request.created_by,
            opening_hours: request.opening_hours.clone(),
            description: request.description.clone(),
            logo: request.logo.clone(),
            created_at: now,
            updated_at: now,
        };
        self.stores.insert(
            store.id,
            Row {
                seq: self.next_seq(),
                record: store.clone(),
            },
        );
        Ok(store)
    }

    #[instrument(skip(self), fields(store_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&self, id: StoreId) -> Result<Option<StoreDBResponse>> {
        Ok(self.stores.get(&id).map(|row| row.record.clone()))
    }

    #[instrument(skip(self, filter), fields(created_by = %abbrev_uuid(&filter.created_by)), err)]
    async fn list(&self, filter: &StoreFilter) -> Result<Vec<StoreDBResponse>> {
        let rows: Vec<_> = self
            .stores
            .iter()
            .filter(|entry| {
                let store = &entry.value().record;
                store.created_by == filter.created_by && (!filter.active_only || store.is_active)
            })
            .map(|entry| entry.value().clone())
            .collect();

        Ok(newest_first(rows, |s| s.created_at))
    }

    #[instrument(skip(self, request), fields(store_id = %abbrev_uuid(&id)), err)]
    async fn update(&self, id: StoreId, request: &StoreUpdateDBRequest) -> Result<StoreDBResponse> {
        let mut row = self.stores.get_mut(&id).ok_or(DbError::NotFound)?;
        row.record.apply(request, Utc::now());
        Ok(row.record.clone())
    }

    #[instrument(skip(self), fields(store_id = %abbrev_uuid(&id)), err)]
    async fn deactivate(&self, id: StoreId) -> Result<bool> {
        let Some(mut row) = self.stores.get_mut(&id) else {
            return Ok(false);
        };
        row.record.is_active = false;
        row.record.updated_at = Utc::now();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::auth::tokens::SingleUseToken;
    use crate::config::TokenLifetimes;
    use crate::db::models::accounts::StoredToken;
    use std::sync::Arc;

    fn owner_request(email: &str) -> AccountCreateDBRequest {
        AccountCreateDBRequest {
            full_name: "Jane Doe".to_string(),
            email: email.to_string(),
            phone_number: Some("+2348012345678".to_string()),
            password_hash: Some("hash".to_string()),
            role: Role::Owner,
            is_verified: false,
            is_first_login: false,
            agreed_to_terms: true,
            profile_picture: None,
            auth_provider: AuthProvider::Local,
            auth_provider_id: None,
            created_by: None,
            token: None,
        }
    }

    #[tokio::test]
    async fn test_email_is_unique_case_insensitively() {
        let db = InMemoryDatabase::new();
        AccountRepository::create(&db, &owner_request("jane@x.com")).await.unwrap();

        let err = AccountRepository::create(&db, &owner_request("JANE@X.com")).await.unwrap_err();
        assert!(err.is_duplicate_email());

        let found = db.get_by_email("Jane@X.Com").await.unwrap().unwrap();
        assert_eq!(found.email, "jane@x.com");
    }

    #[tokio::test]
    async fn test_consume_token_once() {
        let db = InMemoryDatabase::new();
        let token = SingleUseToken::generate(TokenPurpose::EmailVerification, &TokenLifetimes::default());
        let mut request = owner_request("jane@x.com");
        request.token = Some(PendingToken::from(&token));
        let account = AccountRepository::create(&db, &request).await.unwrap();
        assert!(account.email_verification.is_some());

        let now = Utc::now();
        let redeemed = db
            .consume_token(TokenPurpose::EmailVerification, &token.hash, now, &Redemption::MarkVerified)
            .await
            .unwrap()
            .unwrap();
        assert!(redeemed.is_verified);
        assert!(redeemed.email_verification.is_none());

        let again = db
            .consume_token(TokenPurpose::EmailVerification, &token.hash, now, &Redemption::MarkVerified)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_consume_token_rejects_wrong_purpose_and_expiry() {
        let db = InMemoryDatabase::new();
        let account = AccountRepository::create(&db, &owner_request("jane@x.com")).await.unwrap();
        let expires_at = Utc::now() + chrono::Duration::minutes(5);
        db.set_token(
            account.id,
            &PendingToken {
                purpose: TokenPurpose::PasswordReset,
                stored: StoredToken {
                    hash: "digest".to_string(),
                    expires_at,
                },
            },
        )
        .await
        .unwrap();

        let redemption = Redemption::SetPassword {
            password_hash: "new".to_string(),
        };
        assert!(
            db.consume_token(TokenPurpose::EmailVerification, "digest", Utc::now(), &redemption)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            db.consume_token(TokenPurpose::PasswordReset, "digest", expires_at, &redemption)
                .await
                .unwrap()
                .is_none()
        );

        let redeemed = db
            .consume_token(TokenPurpose::PasswordReset, "digest", Utc::now(), &redemption)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(redeemed.password_hash.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_concurrent_consumption_has_one_winner() {
        let db = Arc::new(InMemoryDatabase::new());
        let token = SingleUseToken::generate(TokenPurpose::PasswordReset, &TokenLifetimes::default());
        let mut request = owner_request("jane@x.com");
        request.token = Some(PendingToken::from(&token));
        AccountRepository::create(db.as_ref(), &request).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let db = db.clone();
            let hash = token.hash.clone();
            handles.push(tokio::spawn(async move {
                db.consume_token(
                    TokenPurpose::PasswordReset,
                    &hash,
                    Utc::now(),
                    &Redemption::SetPassword {
                        password_hash: format!("hash-{i}"),
                    },
                )
                .await
                .unwrap()
                .is_some()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_list_filters_creator_and_active() {
        let db = InMemoryDatabase::new();
        let owner = AccountRepository::create(&db, &owner_request("owner@x.com")).await.unwrap();

        let mut first = owner_request("a@x.com");
        first.created_by = Some(owner.id);
        let first = AccountRepository::create(&db, &first).await.unwrap();
        let mut second = owner_request("b@x.com");
        second.created_by = Some(owner.id);
        let second = AccountRepository::create(&db, &second).await.unwrap();

        let filter = AccountFilter {
            created_by: Some(owner.id),
            active_only: true,
        };
        let ids: Vec<_> = AccountRepository::list(&db, &filter).await.unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        AccountRepository::update(&db, first.id, &AccountUpdateDBRequest::deactivate())
            .await
            .unwrap();
        let ids: Vec<_> = AccountRepository::list(&db, &filter).await.unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![second.id]);
    }
}
