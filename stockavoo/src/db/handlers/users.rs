//! Postgres repository for accounts.

use crate::types::{UserId, abbrev_uuid};
use crate::{
    api::models::users::{AuthProvider, Role},
    auth::tokens::TokenPurpose,
    db::{
        errors::{DbError, Result},
        handlers::repository::AccountRepository,
        models::accounts::{
            AccountCreateDBRequest, AccountDBResponse, AccountFilter, AccountUpdateDBRequest, PendingToken, Redemption,
            StoredToken,
        },
    },
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::instrument;
use uuid::Uuid;

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Account {
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
    pub email_verification_token_hash: Option<String>,
    pub email_verification_expires_at: Option<DateTime<Utc>>,
    pub password_reset_token_hash: Option<String>,
    pub password_reset_expires_at: Option<DateTime<Utc>>,
    pub password_setup_token_hash: Option<String>,
    pub password_setup_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Account> for AccountDBResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            full_name: account.full_name,
            email: account.email,
            phone_number: account.phone_number,
            password_hash: account.password_hash,
            role: account.role,
            is_verified: account.is_verified,
            is_active: account.is_active,
            is_first_login: account.is_first_login,
            agreed_to_terms: account.agreed_to_terms,
            profile_picture: account.profile_picture,
            auth_provider: account.auth_provider,
            auth_provider_id: account.auth_provider_id,
            created_by: account.created_by,
            last_login: account.last_login,
            email_verification: StoredToken::from_columns(
                account.email_verification_token_hash,
                account.email_verification_expires_at,
            ),
            password_reset: StoredToken::from_columns(account.password_reset_token_hash, account.password_reset_expires_at),
            password_setup: StoredToken::from_columns(account.password_setup_token_hash, account.password_setup_expires_at),
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

/// Hash and expiry column names for a token purpose.
fn token_columns(purpose: TokenPurpose) -> (&'static str, &'static str) {
    match purpose {
        TokenPurpose::EmailVerification => ("email_verification_token_hash", "email_verification_expires_at"),
        TokenPurpose::PasswordReset => ("password_reset_token_hash", "password_reset_expires_at"),
        TokenPurpose::PasswordSetup => ("password_setup_token_hash", "password_setup_expires_at"),
    }
}

/// Split an optional initial token into the per-purpose column values for an insert.
fn initial_token_columns(token: Option<&PendingToken>, purpose: TokenPurpose) -> (Option<&str>, Option<DateTime<Utc>>) {
    match token {
        Some(t) if t.purpose == purpose => (Some(t.stored.hash.as_str()), Some(t.stored.expires_at)),
        _ => (None, None),
    }
}

pub struct Users {
    db: PgPool,
}

impl Users {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl AccountRepository for Users {
    #[instrument(skip(self, request), fields(role = %request.role, provider = %request.auth_provider), err)]
    async fn create(&self, request: &AccountCreateDBRequest) -> Result<AccountDBResponse> {
        let id = Uuid::new_v4();
        let token = request.token.as_ref();
        let (verify_hash, verify_exp) = initial_token_columns(token, TokenPurpose::EmailVerification);
        let (reset_hash, reset_exp) = initial_token_columns(token, TokenPurpose::PasswordReset);
        let (setup_hash, setup_exp) = initial_token_columns(token, TokenPurpose::PasswordSetup);

        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (
                id, full_name, email, phone_number, password_hash, role,
                is_verified, is_first_login, agreed_to_terms, profile_picture,
                auth_provider, auth_provider_id, created_by,
                email_verification_token_hash, email_verification_expires_at,
                password_reset_token_hash, password_reset_expires_at,
                password_setup_token_hash, password_setup_expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.full_name)
        .bind(&request.email)
        .bind(&request.phone_number)
        .bind(&request.password_hash)
        .bind(request.role)
        .bind(request.is_verified)
        .bind(request.is_first_login)
        .bind(request.agreed_to_terms)
        .bind(&request.profile_picture)
        .bind(request.auth_provider)
        .bind(&request.auth_provider_id)
        .bind(request.created_by)
        .bind(verify_hash)
        .bind(verify_exp)
        .bind(reset_hash)
        .bind(reset_exp)
        .bind(setup_hash)
        .bind(setup_exp)
        .fetch_one(&self.db)
        .await?;

        Ok(account.into())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&self, id: UserId) -> Result<Option<AccountDBResponse>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(account.map(Into::into))
    }

    #[instrument(skip(self, email), err)]
    async fn get_by_email(&self, email: &str) -> Result<Option<AccountDBResponse>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;

        Ok(account.map(Into::into))
    }

    #[instrument(skip(self, provider_id), fields(provider = %provider), err)]
    async fn get_by_provider(&self, provider: AuthProvider, provider_id: &str) -> Result<Option<AccountDBResponse>> {
        let account =
            sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE auth_provider = $1 AND auth_provider_id = $2")
                .bind(provider)
                .bind(provider_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(account.map(Into::into))
    }

    #[instrument(skip(self, filter), fields(active_only = filter.active_only), err)]
    async fn list(&self, filter: &AccountFilter) -> Result<Vec<AccountDBResponse>> {
        let accounts = sqlx::query_as::<_, Account>(
            r#"
            SELECT * FROM accounts
            WHERE ($1::uuid IS NULL OR created_by = $1)
              AND (NOT $2 OR is_active)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.created_by)
        .bind(filter.active_only)
        .fetch_all(&self.db)
        .await?;

        Ok(accounts.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&self, id: UserId, request: &AccountUpdateDBRequest) -> Result<AccountDBResponse> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts SET
                full_name = COALESCE($2, full_name),
                phone_number = COALESCE($3, phone_number),
                profile_picture = COALESCE($4, profile_picture),
                role = COALESCE($5, role),
                is_active = COALESCE($6, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.full_name)
        .bind(&request.phone_number)
        .bind(&request.profile_picture)
        .bind(request.role)
        .bind(request.is_active)
        .fetch_optional(&self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(account.into())
    }

    #[instrument(skip(self, token), fields(user_id = %abbrev_uuid(&id), purpose = %token.purpose), err)]
    async fn set_token(&self, id: UserId, token: &PendingToken) -> Result<()> {
        let (hash_col, exp_col) = token_columns(token.purpose);
        let query = format!("UPDATE accounts SET {hash_col} = $2, {exp_col} = $3, updated_at = NOW() WHERE id = $1");

        let result = sqlx::query(&query)
            .bind(id)
            .bind(&token.stored.hash)
            .bind(token.stored.expires_at)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
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
        let (hash_col, exp_col) = token_columns(purpose);
        let (mark_verified, password_hash, finish_setup) = match redemption {
            Redemption::MarkVerified => (true, None, false),
            Redemption::SetPassword { password_hash } => (false, Some(password_hash.as_str()), false),
            Redemption::CompleteSetup { password_hash } => (true, Some(password_hash.as_str()), true),
        };

        // The predicate and the clear happen in one statement, so two concurrent
        // redemptions of the same digest cannot both match.
        let query = format!(
            r#"
            UPDATE accounts SET
                {hash_col} = NULL,
                {exp_col} = NULL,
                is_verified = is_verified OR $3,
                password_hash = COALESCE($4, password_hash),
                is_first_login = is_first_login AND NOT $5,
                updated_at = $2
            WHERE {hash_col} = $1 AND {exp_col} > $2
            RETURNING *
            "#
        );

        let account = sqlx::query_as::<_, Account>(&query)
            .bind(hash)
            .bind(now)
            .bind(mark_verified)
            .bind(password_hash)
            .bind(finish_setup)
            .fetch_optional(&self.db)
            .await?;

        Ok(account.map(Into::into))
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE accounts SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, password_hash), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn set_password(&self, id: UserId, password_hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE accounts SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_columns_are_distinct_per_purpose() {
        let purposes = [
            TokenPurpose::EmailVerification,
            TokenPurpose::PasswordReset,
            TokenPurpose::PasswordSetup,
        ];
        let mut seen = std::collections::HashSet::new();
        for purpose in purposes {
            let (hash, exp) = token_columns(purpose);
            assert!(seen.insert(hash));
            assert!(seen.insert(exp));
        }
    }

    #[test]
    fn test_initial_token_only_fills_its_own_purpose() {
        let token = PendingToken {
            purpose: TokenPurpose::PasswordSetup,
            stored: StoredToken {
                hash: "digest".to_string(),
                expires_at: Utc::now(),
            },
        };
        assert_eq!(
            initial_token_columns(Some(&token), TokenPurpose::PasswordSetup).0,
            Some("digest")
        );
        assert_eq!(initial_token_columns(Some(&token), TokenPurpose::EmailVerification), (None, None));
        assert_eq!(initial_token_columns(None, TokenPurpose::PasswordSetup), (None, None));
    }
}
