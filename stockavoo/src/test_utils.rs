//! Test helpers: fast config, account fixtures, a recording mailer and an in-process server.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum_test::TestServer;
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    AppState,
    api::models::users::{AuthProvider, Role},
    build_router,
    config::{Config, EmailConfig, EmailTransportConfig},
    db::{
        Storage,
        handlers::AccountRepository,
        memory::InMemoryDatabase,
        models::accounts::{AccountCreateDBRequest, AccountDBResponse},
    },
    email::{Mailer, OutgoingEmail},
    errors::Error,
};

const MAIL_WAIT: Duration = Duration::from_secs(5);

pub fn create_test_config() -> Config {
    // reqwest is built without a bundled rustls provider
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let emails = std::env::temp_dir().join(format!("stockavoo-test-emails-{}", std::process::id()));

    let mut config = Config {
        secret_key: Some("test-secret-key-for-session-tokens".to_string()),
        email: EmailConfig {
            transport: EmailTransportConfig::File {
                path: emails.to_string_lossy().to_string(),
            },
            ..Default::default()
        },
        ..Default::default()
    };
    // Cheap hashing keeps the suite fast.
    config.auth.password.argon2_memory_kib = 1024;
    config.auth.password.argon2_iterations = 1;
    config
}

/// An active, verified account that exists only in memory.
pub fn account_with_role(role: Role) -> AccountDBResponse {
    let now = Utc::now();
    AccountDBResponse {
        id: Uuid::new_v4(),
        full_name: format!("Test {role}"),
        email: format!("{}@example.com", Uuid::new_v4().simple()),
        phone_number: Some("+2348012345678".to_string()),
        password_hash: None,
        role,
        is_verified: true,
        is_active: true,
        is_first_login: false,
        agreed_to_terms: true,
        profile_picture: None,
        auth_provider: AuthProvider::Local,
        auth_provider_id: None,
        created_by: None,
        last_login: None,
        email_verification: None,
        password_reset: None,
        password_setup: None,
        created_at: now,
        updated_at: now,
    }
}

/// Store an active, verified local account without a password.
pub async fn insert_account(db: &InMemoryDatabase, role: Role, email: &str) -> AccountDBResponse {
    let request = AccountCreateDBRequest {
        full_name: format!("Test {role}"),
        email: email.to_lowercase(),
        phone_number: Some("+2348012345678".to_string()),
        password_hash: None,
        role,
        is_verified: true,
        is_first_login: false,
        agreed_to_terms: true,
        profile_picture: None,
        auth_provider: AuthProvider::Local,
        auth_provider_id: None,
        created_by: None,
        token: None,
    };
    AccountRepository::create(db, &request).await.expect("Failed to insert account")
}

/// Captures every email instead of delivering it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), Error> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    /// The most recent email sent to `to_email`.
    pub fn last_to(&self, to_email: &str) -> Option<OutgoingEmail> {
        self.sent().into_iter().rev().find(|e| e.to_email == to_email)
    }

    /// Wait for the first email to `to_email`. Sends happen on a spawned task.
    pub async fn wait_for(&self, to_email: &str) -> OutgoingEmail {
        let found = tokio::time::timeout(MAIL_WAIT, async {
            loop {
                if let Some(email) = self.sent().into_iter().find(|e| e.to_email == to_email) {
                    return email;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        found.unwrap_or_else(|_| panic!("no email to {to_email} within {MAIL_WAIT:?}"))
    }

    /// Wait until at least `count` emails have been sent.
    pub async fn wait_for_count(&self, count: usize) {
        tokio::time::timeout(MAIL_WAIT, async {
            while self.sent().len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {count} emails, got {}", self.sent().len()));
    }
}

/// A mailer whose every delivery fails.
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _email: OutgoingEmail) -> Result<(), Error> {
        Err(Error::EmailDelivery {
            message: "SMTP: connection refused".to_string(),
        })
    }
}

/// The raw token in the link that follows `marker` (e.g. `"/verify-email/"`).
pub fn token_from_link(email: &OutgoingEmail, marker: &str) -> String {
    let start = email
        .text
        .find(marker)
        .unwrap_or_else(|| panic!("no {marker} link in email: {}", email.text))
        + marker.len();
    email.text[start..]
        .chars()
        .take_while(|c| !c.is_whitespace())
        .collect()
}

/// A valid registration body for `email`. The password is `P@ssw0rd1`.
pub fn register_body(email: &str) -> Value {
    json!({
        "fullName": "Jane Doe",
        "email": email,
        "password": "P@ssw0rd1",
        "confirmPassword": "P@ssw0rd1",
        "phoneNumber": "+2348012345678",
        "agreedToTerms": true,
    })
}

pub fn create_test_state(config: Config, mailer: Arc<dyn Mailer>) -> AppState {
    AppState::builder()
        .storage(Storage::in_memory())
        .config(config)
        .mailer(mailer)
        .build()
}

pub fn create_test_server(state: AppState) -> TestServer {
    let router = build_router(state).expect("Failed to build router");
    TestServer::new(router.into_make_service()).expect("Failed to create test server")
}

/// Server over in-memory storage with a recording mailer.
pub fn create_test_app() -> (TestServer, Arc<RecordingMailer>) {
    let mailer = Arc::new(RecordingMailer::default());
    let server = create_test_server(create_test_state(create_test_config(), mailer.clone()));
    (server, mailer)
}

/// A test server plus shortcuts for the common account setups.
pub struct TestApp {
    pub server: TestServer,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        let (server, mailer) = create_test_app();
        Self { server, mailer }
    }

    pub fn with_config(config: Config) -> Self {
        let mailer = Arc::new(RecordingMailer::default());
        let server = create_test_server(create_test_state(config, mailer.clone()));
        Self { server, mailer }
    }

    /// Register an owner without verifying the email. Returns the session token.
    pub async fn register_unverified_owner(&self, email: &str) -> String {
        let response = self.server.post("/api/auth/register").json(&register_body(email)).await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json::<Value>()["data"]["token"]
            .as_str()
            .expect("token in registration response")
            .to_string()
    }

    /// Register an owner and verify the email through the mailed link. Returns the session token.
    pub async fn register_owner(&self, email: &str) -> String {
        let token = self.register_unverified_owner(email).await;
        let verification = self.mailer.wait_for(&email.to_lowercase()).await;
        let raw = token_from_link(&verification, "/verify-email/");
        self.server
            .get(&format!("/api/auth/verify-email/{raw}"))
            .await
            .assert_status_ok();
        token
    }

    /// Invite `email` as `role` and complete setup with password `Staff#Pass1`.
    /// Returns the new account's id and session token.
    pub async fn invite_and_setup(&self, owner_token: &str, email: &str, role: &str) -> (String, String) {
        let invited = self
            .server
            .post("/api/users")
            .authorization_bearer(owner_token)
            .json(&json!({ "fullName": "Staff Member", "email": email, "phoneNumber": "+2348012345678", "role": role }))
            .await;
        invited.assert_status(axum::http::StatusCode::CREATED);
        let id = invited.json::<Value>()["data"]["id"].as_str().expect("id").to_string();

        let invitation = self.mailer.wait_for(email).await;
        let raw = token_from_link(&invitation, "/setup-password/");
        let setup = self
            .server
            .post(&format!("/api/auth/setup-password/{raw}"))
            .json(&json!({ "password": "Staff#Pass1" }))
            .await;
        setup.assert_status_ok();
        let token = setup.json::<Value>()["data"]["token"].as_str().expect("token").to_string();
        (id, token)
    }
}
