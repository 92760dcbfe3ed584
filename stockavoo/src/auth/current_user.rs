//! The gatekeeper: turns a bearer token into the live account it was issued for.

use std::ops::Deref;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use tracing::{debug, instrument, trace};

use crate::{
    AppState,
    auth::session,
    config::Config,
    db::{handlers::AccountRepository, models::accounts::AccountDBResponse},
    errors::{Error, Result},
    types::abbrev_uuid,
};

pub const NOT_LOGGED_IN: &str = "You are not logged in. Please log in to access this resource.";
pub const USER_NO_LONGER_EXISTS: &str = "The user belonging to this token no longer exists.";

/// The authenticated account, loaded fresh for this request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AccountDBResponse);

impl Deref for CurrentUser {
    type Target = AccountDBResponse;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<AccountDBResponse> for CurrentUser {
    fn from(account: AccountDBResponse) -> Self {
        Self(account)
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Authenticate a request from its headers.
///
/// Missing header, bad token, vanished account and deactivated account each fail with their
/// own 401.
#[instrument(skip_all, err)]
pub async fn authenticate(headers: &HeaderMap, config: &Config, accounts: &dyn AccountRepository) -> Result<CurrentUser> {
    let Some(token) = bearer_token(headers) else {
        trace!("No bearer token on request");
        return Err(Error::Unauthenticated {
            message: Some(NOT_LOGGED_IN.to_string()),
        });
    };

    let user_id = session::verify_session_token(token, config)?;

    let Some(account) = accounts.get_by_id(user_id).await? else {
        debug!(user_id = %abbrev_uuid(&user_id), "Session token for a missing account");
        return Err(Error::Unauthenticated {
            message: Some(USER_NO_LONGER_EXISTS.to_string()),
        });
    };

    if !account.is_active {
        debug!(user_id = %abbrev_uuid(&user_id), "Session token for a deactivated account");
        return Err(Error::AccountDeactivated);
    }

    Ok(CurrentUser(account))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // Several gates may run on one request; authenticate once.
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let user = authenticate(&parts.headers, &state.config, state.storage.accounts.as_ref()).await?;
        debug!(user_id = %abbrev_uuid(&user.id), role = %user.role, "Authenticated request");
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// A [`CurrentUser`] whose email address has been verified.
#[derive(Debug, Clone)]
pub struct VerifiedUser(pub CurrentUser);

impl Deref for VerifiedUser {
    type Target = CurrentUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequestParts<AppState> for VerifiedUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        crate::auth::permissions::require_verification(&user)?;
        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::models::users::Role,
        db::{memory::InMemoryDatabase, models::accounts::AccountUpdateDBRequest},
        test_utils::{create_test_config, insert_account},
    };
    use axum::http::HeaderValue;
    use uuid::Uuid;

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
        headers
    }

    fn unauthenticated_message(result: Result<CurrentUser>) -> String {
        match result {
            Err(Error::Unauthenticated { message }) => message.unwrap_or_default(),
            other => panic!("expected Unauthenticated, got {other:?}"),
        }
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&bearer("abc")), Some("abc"));
        assert_eq!(bearer_token(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("BearerXYZ"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
    }

    #[tokio::test]
    async fn test_missing_token() {
        let db = InMemoryDatabase::new();
        let config = create_test_config();
        let result = authenticate(&HeaderMap::new(), &config, &db).await;
        assert_eq!(unauthenticated_message(result), NOT_LOGGED_IN);
    }

    #[tokio::test]
    async fn test_invalid_token() {
        let db = InMemoryDatabase::new();
        let config = create_test_config();
        let result = authenticate(&bearer("garbage"), &config, &db).await;
        assert_eq!(unauthenticated_message(result), session::INVALID_SESSION);
    }

    #[tokio::test]
    async fn test_valid_token_for_missing_account() {
        let db = InMemoryDatabase::new();
        let config = create_test_config();
        let token = session::create_session_token(Uuid::new_v4(), &config).unwrap();
        let result = authenticate(&bearer(&token), &config, &db).await;
        assert_eq!(unauthenticated_message(result), USER_NO_LONGER_EXISTS);
    }

    #[tokio::test]
    async fn test_active_and_deactivated_accounts() {
        let db = InMemoryDatabase::new();
        let config = create_test_config();
        let account = insert_account(&db, Role::Clerk, "clerk@example.com").await;
        let token = session::create_session_token(account.id, &config).unwrap();

        let user = authenticate(&bearer(&token), &config, &db).await.unwrap();
        assert_eq!(user.id, account.id);
        assert_eq!(user.role, Role::Clerk);

        AccountRepository::update(&db, account.id, &AccountUpdateDBRequest::deactivate()).await.unwrap();
        let result = authenticate(&bearer(&token), &config, &db).await;
        assert!(matches!(result, Err(Error::AccountDeactivated)));
    }

    #[tokio::test]
    async fn test_verified_user_gate() {
        use crate::{
            db::{Storage, models::accounts::AccountCreateDBRequest},
            test_utils::RecordingMailer,
        };
        use axum::{Router, http::StatusCode, routing::get};
        use std::sync::Arc;

        async fn verified_only(user: VerifiedUser) -> String {
            user.email.clone()
        }

        let db = Arc::new(InMemoryDatabase::new());
        let config = create_test_config();
        let verified = insert_account(&db, Role::Owner, "verified@example.com").await;
        let pending = AccountRepository::create(
            db.as_ref(),
            &AccountCreateDBRequest {
                full_name: "Pending Owner".to_string(),
                email: "pending@example.com".to_string(),
                phone_number: None,
                password_hash: None,
                role: Role::Owner,
                is_verified: false,
                is_first_login: false,
                agreed_to_terms: true,
                profile_picture: None,
                auth_provider: crate::api::models::users::AuthProvider::Local,
                auth_provider_id: None,
                created_by: None,
                token: None,
            },
        )
        .await
        .unwrap();

        let state = AppState::builder()
            .storage(Storage {
                accounts: db.clone(),
                stores: db,
                pool: None,
            })
            .config(config.clone())
            .mailer(Arc::new(RecordingMailer::default()))
            .build();
        let server = axum_test::TestServer::new(Router::new().route("/verified", get(verified_only)).with_state(state)).unwrap();

        server.get("/verified").await.assert_status(StatusCode::UNAUTHORIZED);

        let pending_token = session::create_session_token(pending.id, &config).unwrap();
        server
            .get("/verified")
            .authorization_bearer(&pending_token)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let verified_token = session::create_session_token(verified.id, &config).unwrap();
        let response = server.get("/verified").authorization_bearer(&verified_token).await;
        response.assert_status_ok();
        response.assert_text("verified@example.com");
    }
}
