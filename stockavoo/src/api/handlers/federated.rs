//! Browser-facing OAuth endpoints. Every outcome is a redirect back to the frontend.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{info, warn};
use url::Url;

use crate::{
    AppState,
    api::models::{auth::OAuthCallbackQuery, users::AuthProvider},
    auth::{
        federated::{
            CLEAR_STATE_COOKIE, OAuthClient, resolve_account, state_from_cookies, state_matches,
        },
        session,
        tokens::generate_raw_token,
    },
    errors::Error,
    types::abbrev_uuid,
};

const SIGN_IN_FAILED: &str = "Authentication failed. Please try again.";

/// 302 to `location`.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Frontend URL `path` with `key=value` appended.
fn client_link(client_url: &str, path: &str, key: &str, value: &str) -> String {
    let base = format!("{}{path}", client_url.trim_end_matches('/'));
    match Url::parse(&base) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair(key, value);
            url.to_string()
        }
        Err(_) => base,
    }
}

fn login_error(state: &AppState, message: &str) -> Response {
    found(&client_link(&state.config.client_url, "/login", "error", message))
}

fn start(state: &AppState, provider: AuthProvider) -> Response {
    match OAuthClient::from_config(provider, &state.config) {
        Ok(Some(client)) => {
            let sign_in_state = generate_raw_token();
            (
                StatusCode::FOUND,
                [
                    (header::LOCATION, client.authorize_url(&sign_in_state).to_string()),
                    (header::SET_COOKIE, client.state_cookie(&sign_in_state)),
                ],
            )
                .into_response()
        }
        Ok(None) => {
            warn!(%provider, "Sign-in attempted with an unconfigured provider");
            login_error(state, &format!("{provider} sign-in is not available"))
        }
        Err(e) => {
            warn!(%provider, error = %e, "Failed to build OAuth client");
            login_error(state, SIGN_IN_FAILED)
        }
    }
}

async fn finish(
    state: &AppState,
    provider: AuthProvider,
    headers: &HeaderMap,
    query: OAuthCallbackQuery,
) -> Response {
    let client = match OAuthClient::from_config(provider, &state.config) {
        Ok(Some(client)) => client,
        Ok(None) => return login_error(state, &format!("{provider} sign-in is not available")),
        Err(e) => {
            warn!(%provider, error = %e, "Failed to build OAuth client");
            return login_error(state, SIGN_IN_FAILED);
        }
    };

    if let Some(error) = query.error {
        info!(%provider, %error, "Provider reported a sign-in error");
        return login_error(state, SIGN_IN_FAILED);
    }
    if !state_matches(state_from_cookies(headers), query.state.as_deref()) {
        warn!(%provider, "Sign-in callback state does not match the issuing browser");
        return login_error(state, SIGN_IN_FAILED);
    }
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return login_error(state, SIGN_IN_FAILED);
    };

    let profile = match client.exchange_code(&state.http, &code).await {
        Ok(access_token) => client.fetch_profile(&state.http, &access_token).await,
        Err(e) => Err(e),
    };
    let profile = match profile {
        Ok(profile) => profile,
        Err(e) => {
            warn!(%provider, error = format!("{e:#}"), "OAuth exchange failed");
            return login_error(state, SIGN_IN_FAILED);
        }
    };

    let account = match resolve_account(state.storage.accounts.as_ref(), &profile).await {
        Ok(account) => account,
        Err(e @ (Error::ProviderMismatch { .. } | Error::AccountDeactivated)) => {
            return login_error(state, &e.user_message());
        }
        Err(e) => {
            warn!(%provider, error = %e, "Failed to resolve federated account");
            return login_error(state, SIGN_IN_FAILED);
        }
    };

    match session::create_session_token(account.id, &state.config) {
        Ok(token) => {
            info!(user_id = %abbrev_uuid(&account.id), %provider, "Federated sign-in");
            found(&client_link(&state.config.client_url, "/auth/callback", "token", &token))
        }
        Err(e) => {
            warn!(error = %e, "Failed to issue session token");
            login_error(state, SIGN_IN_FAILED)
        }
    }
}

/// Finish sign-in and expire the state cookie whatever the outcome.
async fn callback(
    state: &AppState,
    provider: AuthProvider,
    headers: &HeaderMap,
    query: OAuthCallbackQuery,
) -> Response {
    let mut response = finish(state, provider, headers, query).await;
    response
        .headers_mut()
        .append(header::SET_COOKIE, HeaderValue::from_static(CLEAR_STATE_COOKIE));
    response
}

/// Start Google sign-in
#[utoipa::path(
    get,
    path = "/auth/google",
    tag = "authentication",
    responses((status = 302, description = "Redirect to Google, or to the frontend login page when disabled"))
)]
#[tracing::instrument(skip_all)]
pub async fn google_start(State(state): State<AppState>) -> Response {
    start(&state, AuthProvider::Google)
}

#[utoipa::path(
    get,
    path = "/auth/google/callback",
    tag = "authentication",
    params(OAuthCallbackQuery),
    responses((status = 302, description = "Redirect to the frontend with a session token or an error"))
)]
#[tracing::instrument(skip_all)]
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    callback(&state, AuthProvider::Google, &headers, query).await
}

/// Start Facebook sign-in
#[utoipa::path(
    get,
    path = "/auth/facebook",
    tag = "authentication",
    responses((status = 302, description = "Redirect to Facebook, or to the frontend login page when disabled"))
)]
#[tracing::instrument(skip_all)]
pub async fn facebook_start(State(state): State<AppState>) -> Response {
    start(&state, AuthProvider::Facebook)
}

#[utoipa::path(
    get,
    path = "/auth/facebook/callback",
    tag = "authentication",
    params(OAuthCallbackQuery),
    responses((status = 302, description = "Redirect to the frontend with a session token or an error"))
)]
#[tracing::instrument(skip_all)]
pub async fn facebook_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    callback(&state, AuthProvider::Facebook, &headers, query).await
}
