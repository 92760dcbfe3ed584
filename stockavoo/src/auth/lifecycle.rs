//! Account lifecycle: registration, login, email verification, password reset and the
//! invited-account setup flow.
//!
//! Every operation performs its durable state change first and only then hands any email to
//! [`email::dispatch`], so delivery failures are logged but never undo or fail the operation.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::{
    api::models::users::{AuthProvider, InviteUser, Role},
    auth::{
        password::{self, Argon2Params},
        session,
        tokens::{SingleUseToken, TokenPurpose},
    },
    config::Config,
    db::{
        errors::DbError,
        handlers::AccountRepository,
        models::accounts::{AccountCreateDBRequest, AccountDBResponse, PendingToken, Redemption},
    },
    email::{self, Mailer, Templates},
    errors::{Error, Result},
    types::{UserId, abbrev_uuid},
};

pub const EMAIL_IN_USE: &str = "Email already in use";
pub const INVITE_EMAIL_IN_USE: &str = "A user with this email already exists";
pub const FORGOT_PASSWORD_RESPONSE: &str = "If an account with that email exists, a password reset link has been sent.";

/// A new self-registered business owner.
#[derive(Debug, Clone)]
pub struct Registration {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub phone_number: String,
}

/// An account together with a freshly issued session token.
#[derive(Debug, Clone)]
pub struct Session {
    pub account: AccountDBResponse,
    pub token: String,
}

fn invalid_token(message: &str) -> Error {
    Error::InvalidOrExpiredToken {
        message: message.to_string(),
    }
}

pub struct Lifecycle<'a> {
    accounts: &'a dyn AccountRepository,
    config: &'a Config,
    mailer: Arc<dyn Mailer>,
    templates: Templates,
}

impl<'a> Lifecycle<'a> {
    pub fn new(accounts: &'a dyn AccountRepository, config: &'a Config, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            accounts,
            config,
            mailer,
            templates: Templates::new(&config.client_url),
        }
    }

    fn argon2(&self) -> Argon2Params {
        Argon2Params::from(&self.config.auth.password)
    }

    /// Enforce the configured password length bounds.
    fn check_password_length(&self, password: &str) -> Result<()> {
        let config = &self.config.auth.password;
        let length = password.chars().count();
        if length < config.min_length {
            return Err(Error::BadRequest {
                message: format!("Password must be at least {} characters long", config.min_length),
            });
        }
        if length > config.max_length {
            return Err(Error::BadRequest {
                message: format!("Password must be no more than {} characters", config.max_length),
            });
        }
        Ok(())
    }

    fn issue(&self, account: AccountDBResponse) -> Result<Session> {
        let token = session::create_session_token(account.id, self.config)?;
        Ok(Session { account, token })
    }

    fn token(&self, purpose: TokenPurpose) -> SingleUseToken {
        SingleUseToken::generate(purpose, &self.config.auth.tokens)
    }

    async fn create(&self, request: &AccountCreateDBRequest, duplicate_message: &str) -> Result<AccountDBResponse> {
        match self.accounts.create(request).await {
            Ok(account) => Ok(account),
            Err(e @ DbError::UniqueViolation { .. }) if e.is_duplicate_email() => Err(Error::DuplicateEmail {
                message: duplicate_message.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn send_verification(&self, account: &AccountDBResponse, token: &SingleUseToken) {
        let lifetime = TokenPurpose::EmailVerification.lifetime(&self.config.auth.tokens);
        let message = self
            .templates
            .verification(&account.full_name, &account.email, &token.raw, lifetime);
        email::dispatch(self.mailer.clone(), message);
    }

    /// Create a business owner account, pending email verification, and log it in.
    #[instrument(skip_all, err)]
    pub async fn register(&self, registration: Registration) -> Result<Session> {
        if !self.config.auth.registration_enabled {
            return Err(Error::Forbidden {
                message: "Registration is currently disabled".to_string(),
            });
        }

        self.check_password_length(&registration.password)?;

        // The unique index is what actually guards against duplicates; this only saves the
        // hashing work in the common case.
        if self.accounts.get_by_email(&registration.email).await?.is_some() {
            return Err(Error::DuplicateEmail {
                message: EMAIL_IN_USE.to_string(),
            });
        }

        let password_hash = password::hash_password(registration.password, self.argon2()).await?;
        let token = self.token(TokenPurpose::EmailVerification);

        let request = AccountCreateDBRequest {
            full_name: registration.full_name,
            email: registration.email,
            phone_number: Some(registration.phone_number),
            password_hash: Some(password_hash),
            role: Role::Owner,
            is_verified: false,
            is_first_login: false,
            agreed_to_terms: true,
            profile_picture: None,
            auth_provider: AuthProvider::Local,
            auth_provider_id: None,
            created_by: None,
            token: Some(PendingToken::from(&token)),
        };
        let account = self.create(&request, EMAIL_IN_USE).await?;
        info!(user_id = %abbrev_uuid(&account.id), "Registered account");

        self.send_verification(&account, &token);
        self.issue(account)
    }

    /// Check credentials and log in. Unknown email, missing password and wrong password are
    /// indistinguishable to the caller.
    #[instrument(skip_all, err)]
    pub async fn login(&self, email: &str, password: String) -> Result<Session> {
        let Some(mut account) = self.accounts.get_by_email(email).await? else {
            password::verify_dummy_password(password, self.argon2()).await?;
            return Err(Error::InvalidCredentials);
        };
        let Some(hash) = account.password_hash.clone() else {
            debug!(user_id = %abbrev_uuid(&account.id), "Login attempt for account without a password");
            password::verify_dummy_password(password, self.argon2()).await?;
            return Err(Error::InvalidCredentials);
        };
        if !password::verify_password(password, hash).await? {
            return Err(Error::InvalidCredentials);
        }
        if !account.is_active {
            return Err(Error::AccountDeactivated);
        }

        let now = Utc::now();
        self.accounts.record_login(account.id, now).await?;
        account.last_login = Some(now);
        self.issue(account)
    }

    #[instrument(skip_all, err)]
    pub async fn verify_email(&self, raw_token: &str) -> Result<AccountDBResponse> {
        let hash = password::hash_opaque_token(raw_token);
        let account = self
            .accounts
            .consume_token(TokenPurpose::EmailVerification, &hash, Utc::now(), &Redemption::MarkVerified)
            .await?
            .ok_or_else(|| invalid_token("Invalid or expired verification token"))?;

        info!(user_id = %abbrev_uuid(&account.id), "Email verified");
        email::dispatch(self.mailer.clone(), self.templates.welcome(&account.full_name, &account.email));
        Ok(account)
    }

    /// Issue a new verification token, replacing the outstanding one.
    #[instrument(skip_all, err)]
    pub async fn resend_verification(&self, email: &str) -> Result<()> {
        let account = self.accounts.get_by_email(email).await?.ok_or_else(|| Error::NotFound {
            message: "No user found with this email".to_string(),
        })?;
        if account.is_verified {
            return Err(Error::BadRequest {
                message: "This email is already verified".to_string(),
            });
        }

        let token = self.token(TokenPurpose::EmailVerification);
        self.accounts.set_token(account.id, &PendingToken::from(&token)).await?;
        self.send_verification(&account, &token);
        Ok(())
    }

    /// Start a password reset. Succeeds the same way whether or not the account exists.
    #[instrument(skip_all, err)]
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        let Some(account) = self.accounts.get_by_email(email).await? else {
            debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let token = self.token(TokenPurpose::PasswordReset);
        self.accounts.set_token(account.id, &PendingToken::from(&token)).await?;

        let lifetime = TokenPurpose::PasswordReset.lifetime(&self.config.auth.tokens);
        let message = self
            .templates
            .password_reset(&account.full_name, &account.email, &token.raw, lifetime);
        email::dispatch(self.mailer.clone(), message);
        Ok(())
    }

    /// Redeem a reset token for a new password and log the account in.
    #[instrument(skip_all, err)]
    pub async fn reset_password(&self, raw_token: &str, new_password: String) -> Result<Session> {
        self.check_password_length(&new_password)?;
        let password_hash = password::hash_password(new_password, self.argon2()).await?;
        let hash = password::hash_opaque_token(raw_token);
        let account = self
            .accounts
            .consume_token(
                TokenPurpose::PasswordReset,
                &hash,
                Utc::now(),
                &Redemption::SetPassword { password_hash },
            )
            .await?
            .ok_or_else(|| invalid_token("This link has expired or is invalid. Please request a new password reset."))?;

        info!(user_id = %abbrev_uuid(&account.id), "Password reset");
        self.issue(account)
    }

    /// Complete an invited account: set its first password, verify it, and log it in.
    #[instrument(skip_all, err)]
    pub async fn setup_password(&self, raw_token: &str, new_password: String) -> Result<Session> {
        self.check_password_length(&new_password)?;

        let password_hash = password::hash_password(new_password, self.argon2()).await?;
        let hash = password::hash_opaque_token(raw_token);
        let account = self
            .accounts
            .consume_token(
                TokenPurpose::PasswordSetup,
                &hash,
                Utc::now(),
                &Redemption::CompleteSetup { password_hash },
            )
            .await?
            .ok_or_else(|| invalid_token("This setup link has expired or is invalid. Please contact your administrator."))?;

        info!(user_id = %abbrev_uuid(&account.id), "Invited account set up");
        self.issue(account)
    }

    /// Create an account on someone else's behalf. It has no password until the invitee
    /// redeems the mailed setup token.
    #[instrument(skip_all, fields(inviter = %abbrev_uuid(&inviter)), err)]
    pub async fn create_invited_user(&self, invite: InviteUser, inviter: UserId) -> Result<AccountDBResponse> {
        if self.accounts.get_by_email(&invite.email).await?.is_some() {
            return Err(Error::DuplicateEmail {
                message: INVITE_EMAIL_IN_USE.to_string(),
            });
        }

        let token = self.token(TokenPurpose::PasswordSetup);
        let request = AccountCreateDBRequest {
            full_name: invite.full_name,
            email: invite.email,
            phone_number: Some(invite.phone_number),
            password_hash: None,
            role: invite.role,
            is_verified: false,
            is_first_login: true,
            agreed_to_terms: true,
            profile_picture: None,
            auth_provider: AuthProvider::Local,
            auth_provider_id: None,
            created_by: Some(inviter),
            token: Some(PendingToken::from(&token)),
        };
        let account = self.create(&request, INVITE_EMAIL_IN_USE).await?;
        info!(user_id = %abbrev_uuid(&account.id), role = %account.role, "Invited account");

        let lifetime = TokenPurpose::PasswordSetup.lifetime(&self.config.auth.tokens);
        let message = self
            .templates
            .invitation(&account.full_name, &account.email, &token.raw, lifetime);
        email::dispatch(self.mailer.clone(), message);
        Ok(account)
    }

    /// Replace a password after checking the current one.
    #[instrument(skip_all, fields(user_id = %abbrev_uuid(&account.id)), err)]
    pub async fn change_password(&self, account: &AccountDBResponse, current: String, new_password: String) -> Result<()> {
        self.check_password_length(&new_password)?;
        let matches = match account.password_hash.clone() {
            Some(hash) => password::verify_password(current, hash).await?,
            None => false,
        };
        if !matches {
            return Err(Error::BadRequest {
                message: "Current password is incorrect".to_string(),
            });
        }

        let password_hash = password::hash_password(new_password, self.argon2()).await?;
        self.accounts.set_password(account.id, &password_hash).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::memory::InMemoryDatabase,
        test_utils::{RecordingMailer, create_test_config, token_from_link},
    };

    struct Harness {
        db: InMemoryDatabase,
        config: Config,
        mailer: Arc<RecordingMailer>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                db: InMemoryDatabase::new(),
                config: create_test_config(),
                mailer: Arc::new(RecordingMailer::default()),
            }
        }

        fn lifecycle(&self) -> Lifecycle<'_> {
            Lifecycle::new(&self.db, &self.config, self.mailer.clone())
        }
    }

    fn jane() -> Registration {
        Registration {
            full_name: "Jane Doe".to_string(),
            email: "jane@x.com".to_string(),
            password: "P@ssw0rd1".to_string(),
            phone_number: "+2348012345678".to_string(),
        }
    }

    fn bob() -> InviteUser {
        InviteUser {
            full_name: "Bob".to_string(),
            email: "bob@x.com".to_string(),
            phone_number: "+2348000000000".to_string(),
            role: Role::Clerk,
        }
    }

    #[tokio::test]
    async fn test_register_creates_unverified_owner() {
        let h = Harness::new();
        let session = h.lifecycle().register(jane()).await.unwrap();

        assert_eq!(session.account.role, Role::Owner);
        assert!(!session.account.is_verified);
        assert!(session.account.password_hash.as_deref().is_some_and(|hash| hash != "P@ssw0rd1"));
        assert_eq!(session::verify_session_token(&session.token, &h.config).unwrap(), session.account.id);

        let mail = h.mailer.wait_for("jane@x.com").await;
        assert!(mail.subject.contains("Verify"));
    }

    #[tokio::test]
    async fn test_register_duplicate_email_any_case() {
        let h = Harness::new();
        h.lifecycle().register(jane()).await.unwrap();

        let mut again = jane();
        again.email = "JANE@X.COM".to_string();
        match h.lifecycle().register(again).await {
            Err(Error::DuplicateEmail { message }) => assert_eq!(message, EMAIL_IN_USE),
            other => panic!("expected DuplicateEmail, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_registration_can_be_disabled() {
        let mut h = Harness::new();
        h.config.auth.registration_enabled = false;
        assert!(matches!(h.lifecycle().register(jane()).await, Err(Error::Forbidden { .. })));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let h = Harness::new();
        h.lifecycle().register(jane()).await.unwrap();

        let wrong_password = h.lifecycle().login("jane@x.com", "Wrong#123".to_string()).await.unwrap_err();
        let unknown = h.lifecycle().login("nobody@x.com", "P@ssw0rd1".to_string()).await.unwrap_err();
        assert!(matches!(wrong_password, Error::InvalidCredentials));
        assert!(matches!(unknown, Error::InvalidCredentials));
        assert_eq!(wrong_password.user_message(), unknown.user_message());
        assert_eq!(wrong_password.status_code(), unknown.status_code());
    }

    #[tokio::test]
    async fn test_login_without_stored_hash_still_verifies() {
        let h = Harness::new();
        h.lifecycle().create_invited_user(bob(), uuid::Uuid::new_v4()).await.unwrap();

        let unknown = h.lifecycle().login("nobody@x.com", "P@ssw0rd1".to_string()).await.unwrap_err();
        let passwordless = h.lifecycle().login("bob@x.com", "P@ssw0rd1".to_string()).await.unwrap_err();
        assert!(matches!(unknown, Error::InvalidCredentials));
        assert!(matches!(passwordless, Error::InvalidCredentials));
        assert!(password::DUMMY_HASH.get().is_some());
    }

    #[tokio::test]
    async fn test_password_length_bounds_follow_config() {
        let mut h = Harness::new();
        h.config.auth.password.min_length = 12;
        h.config.auth.password.max_length = 16;

        let mut short = jane();
        short.password = "P@ssw0rd1".to_string();
        match h.lifecycle().register(short).await {
            Err(Error::BadRequest { message }) => assert_eq!(message, "Password must be at least 12 characters long"),
            other => panic!("expected BadRequest, got {other:?}"),
        }

        let mut long = jane();
        long.password = format!("P@ss{}", "w0rd".repeat(2500));
        match h.lifecycle().register(long).await {
            Err(Error::BadRequest { message }) => assert_eq!(message, "Password must be no more than 16 characters"),
            other => panic!("expected BadRequest, got {other:?}"),
        }

        let mut fits = jane();
        fits.password = "P@ssw0rd1234".to_string();
        let session = h.lifecycle().register(fits).await.unwrap();

        let change = h
            .lifecycle()
            .change_password(&session.account, "P@ssw0rd1234".to_string(), "Sh0rt!".to_string())
            .await;
        assert!(matches!(change, Err(Error::BadRequest { .. })));
        let reset = h.lifecycle().reset_password("deadbeef", "x".repeat(17)).await;
        assert!(matches!(reset, Err(Error::BadRequest { .. })));
        let setup = h.lifecycle().setup_password("deadbeef", "x".repeat(17)).await;
        assert!(matches!(setup, Err(Error::BadRequest { .. })));
    }

    #[tokio::test]
    async fn test_login_records_last_login() {
        let h = Harness::new();
        h.lifecycle().register(jane()).await.unwrap();

        let session = h.lifecycle().login("jane@x.com", "P@ssw0rd1".to_string()).await.unwrap();
        assert!(session.account.last_login.is_some());
        let stored = h.db.get_by_email("jane@x.com").await.unwrap().unwrap();
        assert!(stored.last_login.is_some());
    }

    #[tokio::test]
    async fn test_verify_email_once() {
        let h = Harness::new();
        h.lifecycle().register(jane()).await.unwrap();
        let mail = h.mailer.wait_for("jane@x.com").await;
        let raw = token_from_link(&mail, "/verify-email/");

        let account = h.lifecycle().verify_email(&raw).await.unwrap();
        assert!(account.is_verified);

        let replay = h.lifecycle().verify_email(&raw).await.unwrap_err();
        let unknown = h.lifecycle().verify_email("deadbeef").await.unwrap_err();
        assert_eq!(replay.user_message(), unknown.user_message());
    }

    #[tokio::test]
    async fn test_resend_replaces_token() {
        let h = Harness::new();
        h.lifecycle().register(jane()).await.unwrap();
        let first = token_from_link(&h.mailer.wait_for("jane@x.com").await, "/verify-email/");

        h.lifecycle().resend_verification("jane@x.com").await.unwrap();
        h.mailer.wait_for_count(2).await;
        let second = token_from_link(&h.mailer.last_to("jane@x.com").unwrap(), "/verify-email/");
        assert_ne!(first, second);

        assert!(h.lifecycle().verify_email(&first).await.is_err());
        h.lifecycle().verify_email(&second).await.unwrap();

        assert!(matches!(
            h.lifecycle().resend_verification("jane@x.com").await,
            Err(Error::BadRequest { .. })
        ));
        assert!(matches!(
            h.lifecycle().resend_verification("nobody@x.com").await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_forgot_and_reset_password() {
        let h = Harness::new();
        h.lifecycle().register(jane()).await.unwrap();
        h.mailer.wait_for_count(1).await;

        h.lifecycle().forgot_password("nobody@x.com").await.unwrap();
        h.lifecycle().forgot_password("jane@x.com").await.unwrap();
        h.mailer.wait_for_count(2).await;
        let mail = h.mailer.last_to("jane@x.com").unwrap();
        let raw = token_from_link(&mail, "/reset-password/");

        let session = h.lifecycle().reset_password(&raw, "N3w#Password".to_string()).await.unwrap();
        assert!(!session.token.is_empty());

        h.lifecycle().login("jane@x.com", "N3w#Password".to_string()).await.unwrap();
        assert!(h.lifecycle().login("jane@x.com", "P@ssw0rd1".to_string()).await.is_err());
        assert!(matches!(
            h.lifecycle().reset_password(&raw, "An0ther#Pass".to_string()).await,
            Err(Error::InvalidOrExpiredToken { .. })
        ));
    }

    #[tokio::test]
    async fn test_invited_user_setup() {
        let h = Harness::new();
        let owner = h.lifecycle().register(jane()).await.unwrap().account;

        let bob = h.lifecycle().create_invited_user(bob(), owner.id).await.unwrap();
        assert!(bob.password_hash.is_none());
        assert!(bob.is_first_login);
        assert_eq!(bob.created_by, Some(owner.id));

        assert!(matches!(
            h.lifecycle().login("bob@x.com", "anything".to_string()).await,
            Err(Error::InvalidCredentials)
        ));

        let raw = token_from_link(&h.mailer.wait_for("bob@x.com").await, "/setup-password/");
        assert!(matches!(
            h.lifecycle().setup_password(&raw, "short".to_string()).await,
            Err(Error::BadRequest { .. })
        ));

        let session = h.lifecycle().setup_password(&raw, "Bob#12345".to_string()).await.unwrap();
        assert!(!session.account.is_first_login);
        assert!(session.account.is_verified);
        h.lifecycle().login("bob@x.com", "Bob#12345".to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn test_invite_duplicate_email() {
        let h = Harness::new();
        let owner = h.lifecycle().register(jane()).await.unwrap().account;
        let mut invite = bob();
        invite.email = "jane@x.com".to_string();
        match h.lifecycle().create_invited_user(invite, owner.id).await {
            Err(Error::DuplicateEmail { message }) => assert_eq!(message, INVITE_EMAIL_IN_USE),
            other => panic!("expected DuplicateEmail, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_change_password_checks_current() {
        let h = Harness::new();
        let account = h.lifecycle().register(jane()).await.unwrap().account;

        assert!(matches!(
            h.lifecycle()
                .change_password(&account, "Wrong#123".to_string(), "N3w#Password".to_string())
                .await,
            Err(Error::BadRequest { .. })
        ));
        h.lifecycle()
            .change_password(&account, "P@ssw0rd1".to_string(), "N3w#Password".to_string())
            .await
            .unwrap();
        h.lifecycle().login("jane@x.com", "N3w#Password".to_string()).await.unwrap();
    }
}
