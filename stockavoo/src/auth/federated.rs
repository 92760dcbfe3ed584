//! Sign-in through an external identity provider (Google, Facebook).
//!
//! The HTTP dance is plain OAuth 2.0 authorization code flow: redirect to the provider,
//! receive a code on the callback, exchange it for an access token, fetch the profile.
//! [`resolve_account`] then maps the asserted profile onto a local account.

use anyhow::Context;
use axum::http::{HeaderMap, header};
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use crate::{
    api::models::users::{AuthProvider, Role},
    config::{Config, OAuthClientConfig},
    db::{
        errors::DbError,
        handlers::AccountRepository,
        models::accounts::{AccountCreateDBRequest, AccountDBResponse},
    },
    errors::{Error, Result},
    types::abbrev_uuid,
};

/// Cookie binding an in-flight sign-in to the browser that started it.
pub const STATE_COOKIE: &str = "stockavoo_oauth_state";
/// Expires the state cookie once the callback has run.
pub const CLEAR_STATE_COOKIE: &str = "stockavoo_oauth_state=; Path=/api/auth; HttpOnly; SameSite=Lax; Max-Age=0";
const STATE_MAX_AGE_SECS: u64 = 600;

/// The sign-in state stored in the request's cookies.
pub fn state_from_cookies(headers: &HeaderMap) -> Option<&str> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies
        .split(';')
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, _)| *name == STATE_COOKIE)
        .map(|(_, value)| value)
}

/// Whether the callback's `state` matches the one issued to this browser.
pub fn state_matches(issued: Option<&str>, returned: Option<&str>) -> bool {
    matches!((issued, returned), (Some(issued), Some(returned)) if !issued.is_empty() && issued == returned)
}

/// Identity asserted by a provider after a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedProfile {
    pub provider: AuthProvider,
    /// The provider's stable id for the user
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub picture: Option<String>,
}

impl FederatedProfile {
    /// The address the account is stored under. Providers that withheld an email get a
    /// deterministic placeholder derived from the subject id.
    pub fn account_email(&self) -> String {
        match &self.email {
            Some(email) => email.trim().to_lowercase(),
            None => format!("{}@{}.user", self.subject, self.provider),
        }
    }
}

fn mismatch(existing: AuthProvider) -> Error {
    let message = match existing {
        AuthProvider::Local => "An account with this email already exists. Please login with your email and password.",
        _ => "An account with this email already exists. Please login with your registered method.",
    };
    Error::ProviderMismatch {
        message: message.to_string(),
    }
}

/// Find or create the account for a federated identity.
///
/// Lookup is by provider subject first, then by email. An email match registered through
/// another provider is a [`Error::ProviderMismatch`]. New accounts start verified with terms
/// accepted.
#[instrument(skip_all, fields(provider = %profile.provider), err)]
pub async fn resolve_account(accounts: &dyn AccountRepository, profile: &FederatedProfile) -> Result<AccountDBResponse> {
    let now = Utc::now();

    let existing = match accounts.get_by_provider(profile.provider, &profile.subject).await? {
        Some(account) => Some(account),
        None if profile.email.is_some() => accounts.get_by_email(&profile.account_email()).await?,
        None => None,
    };

    if let Some(mut account) = existing {
        if account.auth_provider != profile.provider {
            debug!(user_id = %abbrev_uuid(&account.id), existing = %account.auth_provider, "Federated sign-in for account with another provider");
            return Err(mismatch(account.auth_provider));
        }
        if !account.is_active {
            return Err(Error::AccountDeactivated);
        }
        accounts.record_login(account.id, now).await?;
        account.last_login = Some(now);
        return Ok(account);
    }

    let email = profile.account_email();
    let full_name = profile
        .display_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    let request = AccountCreateDBRequest {
        full_name,
        email,
        phone_number: None,
        password_hash: None,
        role: Role::Owner,
        is_verified: true,
        is_first_login: false,
        agreed_to_terms: true,
        profile_picture: profile.picture.clone(),
        auth_provider: profile.provider,
        auth_provider_id: Some(profile.subject.clone()),
        created_by: None,
        token: None,
    };

    let mut account = match accounts.create(&request).await {
        Ok(account) => account,
        // Lost a race with another sign-in or registration for the same address.
        Err(e @ DbError::UniqueViolation { .. }) if e.is_duplicate_email() => {
            let existing = accounts.get_by_email(&request.email).await?.ok_or(DbError::NotFound)?;
            return Err(mismatch(existing.auth_provider));
        }
        Err(e) => return Err(e.into()),
    };
    accounts.record_login(account.id, now).await?;
    account.last_login = Some(now);

    info!(user_id = %abbrev_uuid(&account.id), "Created account from federated sign-in");
    Ok(account)
}

/// Public endpoints of a provider.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub authorize_url: Url,
    pub token_url: Url,
    pub userinfo_url: Url,
    pub scope: &'static str,
}

impl ProviderEndpoints {
    pub fn defaults(provider: AuthProvider) -> Option<Self> {
        let (authorize, token, userinfo, scope) = match provider {
            AuthProvider::Google => (
                "https://accounts.google.com/o/oauth2/v2/auth",
                "https://oauth2.googleapis.com/token",
                "https://openidconnect.googleapis.com/v1/userinfo",
                "openid email profile",
            ),
            AuthProvider::Facebook => (
                "https://www.facebook.com/v18.0/dialog/oauth",
                "https://graph.facebook.com/v18.0/oauth/access_token",
                "https://graph.facebook.com/me?fields=id,name,email,picture",
                "email public_profile",
            ),
            AuthProvider::Local => return None,
        };
        Some(Self {
            authorize_url: Url::parse(authorize).ok()?,
            token_url: Url::parse(token).ok()?,
            userinfo_url: Url::parse(userinfo).ok()?,
            scope,
        })
    }

    fn with_overrides(mut self, config: &OAuthClientConfig) -> Self {
        if let Some(url) = &config.authorize_url {
            self.authorize_url = url.clone();
        }
        if let Some(url) = &config.token_url {
            self.token_url = url.clone();
        }
        if let Some(url) = &config.userinfo_url {
            self.userinfo_url = url.clone();
        }
        self
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Deserialize)]
struct FacebookPictureData {
    url: Option<String>,
}

#[derive(Deserialize)]
struct FacebookPicture {
    data: Option<FacebookPictureData>,
}

#[derive(Deserialize)]
struct FacebookUserInfo {
    id: String,
    name: Option<String>,
    email: Option<String>,
    picture: Option<FacebookPicture>,
}

/// A configured OAuth client for one provider.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    provider: AuthProvider,
    client_id: String,
    client_secret: String,
    endpoints: ProviderEndpoints,
    redirect_uri: Url,
}

impl OAuthClient {
    /// The client for `provider`, or `None` when it is not configured.
    pub fn from_config(provider: AuthProvider, config: &Config) -> Result<Option<Self>> {
        let client_config = match provider {
            AuthProvider::Google => config.auth.federated.google.as_ref(),
            AuthProvider::Facebook => config.auth.federated.facebook.as_ref(),
            AuthProvider::Local => None,
        };
        let (Some(client_config), Some(endpoints)) = (client_config, ProviderEndpoints::defaults(provider)) else {
            return Ok(None);
        };

        let callback = format!("{}/api/auth/{provider}/callback", config.api_url.trim_end_matches('/'));
        let redirect_uri = Url::parse(&callback).map_err(|e| Error::Internal {
            operation: format!("build {provider} callback URL: {e}"),
        })?;

        Ok(Some(Self {
            provider,
            client_id: client_config.client_id.clone(),
            client_secret: client_config.client_secret.clone(),
            endpoints: endpoints.with_overrides(client_config),
            redirect_uri,
        }))
    }

    pub fn provider(&self) -> AuthProvider {
        self.provider
    }

    /// Where to send the browser to start sign-in. The provider echoes `state` back on the
    /// callback.
    pub fn authorize_url(&self, state: &str) -> Url {
        let mut url = self.endpoints.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", self.endpoints.scope)
            .append_pair("state", state);
        url
    }

    /// `Set-Cookie` value holding `state` until the callback arrives.
    pub fn state_cookie(&self, state: &str) -> String {
        let secure = if self.redirect_uri.scheme() == "https" {
            "; Secure"
        } else {
            ""
        };
        format!("{STATE_COOKIE}={state}; Path=/api/auth; HttpOnly; SameSite=Lax; Max-Age={STATE_MAX_AGE_SECS}{secure}")
    }

    /// Trade an authorization code for an access token.
    #[instrument(skip_all, fields(provider = %self.provider), err)]
    pub async fn exchange_code(&self, http: &Client, code: &str) -> anyhow::Result<String> {
        let response: TokenResponse = http
            .post(self.endpoints.token_url.clone())
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ])
            .send()
            .await
            .context("token request failed")?
            .error_for_status()
            .context("token endpoint rejected the code")?
            .json()
            .await
            .context("unreadable token response")?;

        Ok(response.access_token)
    }

    /// Fetch the signed-in user's profile.
    #[instrument(skip_all, fields(provider = %self.provider), err)]
    pub async fn fetch_profile(&self, http: &Client, access_token: &str) -> anyhow::Result<FederatedProfile> {
        let response = http
            .get(self.endpoints.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .context("profile request failed")?
            .error_for_status()
            .context("profile endpoint rejected the access token")?;

        let profile = match self.provider {
            AuthProvider::Facebook => {
                let info: FacebookUserInfo = response.json().await.context("unreadable profile")?;
                FederatedProfile {
                    provider: self.provider,
                    subject: info.id,
                    email: info.email,
                    display_name: info.name,
                    picture: info.picture.and_then(|p| p.data).and_then(|d| d.url),
                }
            }
            _ => {
                let info: GoogleUserInfo = response.json().await.context("unreadable profile")?;
                FederatedProfile {
                    provider: self.provider,
                    subject: info.sub,
                    email: info.email,
                    display_name: info.name,
                    picture: info.picture,
                }
            }
        };
        Ok(profile)
    }
}
