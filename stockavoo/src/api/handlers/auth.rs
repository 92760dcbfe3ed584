//! Registration, login and the single-use token flows.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        auth::{
            AuthEnvelope, AuthPayload, EmailRequest, LoginRequest, RegisterRequest, ResetPasswordRequest, SetupPasswordRequest,
            StatusMessage, UserPayload,
        },
        users::UserResponse,
        validation::ValidatedJson,
    },
    auth::{
        current_user::CurrentUser,
        lifecycle::{FORGOT_PASSWORD_RESPONSE, Registration, Session},
    },
    errors::Error,
};

impl From<Session> for AuthPayload {
    fn from(session: Session) -> Self {
        Self {
            user: UserResponse::from(session.account),
            token: session.token,
        }
    }
}

/// Register a new business owner
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    tag = "authentication",
    responses(
        (status = 201, description = "Account created and logged in", body = AuthEnvelope<AuthPayload>),
        (status = 400, description = "Validation failed or email already in use"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthEnvelope<AuthPayload>>), Error> {
    let registration = Registration {
        full_name: request.full_name.unwrap_or_default(),
        email: request.email.unwrap_or_default(),
        password: request.password.unwrap_or_default(),
        phone_number: request.phone_number.unwrap_or_default(),
    };
    let session = state.lifecycle().register(registration).await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthEnvelope::success(
            "Registration successful! Please check your email to verify your account.",
            session.into(),
        )),
    ))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Logged in", body = AuthEnvelope<AuthPayload>),
        (status = 401, description = "Invalid credentials or account deactivated"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<Json<AuthEnvelope<AuthPayload>>, Error> {
    let email = request.email.unwrap_or_default();
    let session = state.lifecycle().login(&email, request.password.unwrap_or_default()).await?;
    Ok(Json(AuthEnvelope::success("Login successful", session.into())))
}

#[utoipa::path(
    get,
    path = "/auth/verify-email/{token}",
    tag = "authentication",
    params(("token" = String, Path, description = "Verification token from the email")),
    responses(
        (status = 200, description = "Email verified", body = StatusMessage),
        (status = 400, description = "Invalid or expired token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn verify_email(State(state): State<AppState>, Path(token): Path<String>) -> Result<Json<StatusMessage>, Error> {
    state.lifecycle().verify_email(&token).await?;
    Ok(Json(StatusMessage::success("Email verified successfully! You can now login.")))
}

#[utoipa::path(
    post,
    path = "/auth/resend-verification",
    request_body = EmailRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Verification email sent", body = StatusMessage),
        (status = 400, description = "Already verified"),
        (status = 404, description = "No account with this email"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn resend_verification(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<EmailRequest>,
) -> Result<Json<StatusMessage>, Error> {
    state
        .lifecycle()
        .resend_verification(&request.email.unwrap_or_default())
        .await?;
    Ok(Json(StatusMessage::success("Verification email sent! Please check your inbox.")))
}

/// Request a password reset link. The response does not depend on whether the account exists.
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = EmailRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Reset link sent if the account exists", body = StatusMessage),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<EmailRequest>,
) -> Result<Json<StatusMessage>, Error> {
    state.lifecycle().forgot_password(&request.email.unwrap_or_default()).await?;
    Ok(Json(StatusMessage::success(FORGOT_PASSWORD_RESPONSE)))
}

#[utoipa::path(
    post,
    path = "/auth/reset-password/{token}",
    request_body = ResetPasswordRequest,
    tag = "authentication",
    params(("token" = String, Path, description = "Reset token from the email")),
    responses(
        (status = 200, description = "Password reset and logged in", body = AuthEnvelope<AuthPayload>),
        (status = 400, description = "Invalid or expired token, or invalid password"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    ValidatedJson(request): ValidatedJson<ResetPasswordRequest>,
) -> Result<Json<AuthEnvelope<AuthPayload>>, Error> {
    let session = state
        .lifecycle()
        .reset_password(&token, request.password.unwrap_or_default())
        .await?;
    Ok(Json(AuthEnvelope::success(
        "Password reset successful! You can now login with your new password.",
        session.into(),
    )))
}

#[utoipa::path(
    post,
    path = "/auth/setup-password/{token}",
    request_body = SetupPasswordRequest,
    tag = "authentication",
    params(("token" = String, Path, description = "Setup token from the invitation email")),
    responses(
        (status = 200, description = "Account set up and logged in", body = AuthEnvelope<AuthPayload>),
        (status = 400, description = "Invalid or expired token, or password too short"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn setup_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    ValidatedJson(request): ValidatedJson<SetupPasswordRequest>,
) -> Result<Json<AuthEnvelope<AuthPayload>>, Error> {
    let session = state
        .lifecycle()
        .setup_password(&token, request.password.unwrap_or_default())
        .await?;
    Ok(Json(AuthEnvelope::success(
        "Account setup successful! You can now login.",
        session.into(),
    )))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "authentication",
    responses(
        (status = 200, description = "The logged-in account", body = AuthEnvelope<UserPayload>),
        (status = 401, description = "Not logged in"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn me(current_user: CurrentUser) -> Json<AuthEnvelope<UserPayload>> {
    Json(AuthEnvelope::data(UserPayload {
        user: UserResponse::from(current_user.0),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::test_utils::{
        FailingMailer, create_test_app, create_test_config, create_test_server, create_test_state, register_body,
        token_from_link,
    };

    #[tokio::test]
    async fn test_register_returns_created_user_without_secrets() {
        let (server, _mailer) = create_test_app();
        let response = server.post("/api/auth/register").json(&register_body("jane@x.com")).await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["status"], "success");
        let user = &body["data"]["user"];
        assert_eq!(user["email"], "jane@x.com");
        assert_eq!(user["role"], "owner");
        assert_eq!(user["isVerified"], false);
        for secret in ["password", "passwordHash", "emailVerification", "emailVerificationToken", "emailVerificationExpires"] {
            assert!(user.get(secret).is_none(), "{secret} leaked");
        }
        assert!(body["data"]["token"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[tokio::test]
    async fn test_register_validation_messages() {
        let (server, _mailer) = create_test_app();
        let response = server
            .post("/api/auth/register")
            .json(&json!({ "fullName": "J", "email": "nope", "password": "weak" }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Validation failed");
        let fields: Vec<&str> = body["details"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields[0], "fullName");
        assert!(fields.contains(&"email"));
        assert!(fields.contains(&"agreedToTerms"));
    }

    #[tokio::test]
    async fn test_forgot_password_payload_is_enumeration_safe() {
        let (server, _mailer) = create_test_app();
        server.post("/api/auth/register").json(&register_body("jane@x.com")).await;

        let known = server.post("/api/auth/forgot-password").json(&json!({ "email": "jane@x.com" })).await;
        let unknown = server.post("/api/auth/forgot-password").json(&json!({ "email": "ghost@x.com" })).await;

        assert_eq!(known.status_code(), StatusCode::OK);
        assert_eq!(known.status_code(), unknown.status_code());
        assert_eq!(known.text(), unknown.text());
    }

    #[tokio::test]
    async fn test_reset_password_flow() {
        let (server, mailer) = create_test_app();
        server.post("/api/auth/register").json(&register_body("jane@x.com")).await;
        mailer.wait_for_count(1).await;

        server.post("/api/auth/forgot-password").json(&json!({ "email": "jane@x.com" })).await;
        mailer.wait_for_count(2).await;
        let raw = token_from_link(&mailer.last_to("jane@x.com").unwrap(), "/reset-password/");

        let mismatch = server
            .post(&format!("/api/auth/reset-password/{raw}"))
            .json(&json!({ "password": "N3w#Password", "confirmPassword": "Other#Pass1" }))
            .await;
        mismatch.assert_status(StatusCode::BAD_REQUEST);

        // The rejected request did not burn the token.
        let reset = server
            .post(&format!("/api/auth/reset-password/{raw}"))
            .json(&json!({ "password": "N3w#Password", "confirmPassword": "N3w#Password" }))
            .await;
        reset.assert_status_ok();
        let token = reset.json::<Value>()["data"]["token"].as_str().unwrap().to_string();

        server
            .get("/api/auth/me")
            .authorization_bearer(&token)
            .await
            .assert_status_ok();

        let replay = server
            .post(&format!("/api/auth/reset-password/{raw}"))
            .json(&json!({ "password": "N3w#Password" }))
            .await;
        replay.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_me_requires_login() {
        let (server, _mailer) = create_test_app();
        let response = server.get("/api/auth/me").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.json::<Value>()["message"],
            "You are not logged in. Please log in to access this resource."
        );
    }

    #[tokio::test]
    async fn test_resend_verification_errors() {
        let (server, mailer) = create_test_app();
        let response = server
            .post("/api/auth/resend-verification")
            .json(&json!({ "email": "ghost@x.com" }))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["message"], "No user found with this email");

        server.post("/api/auth/register").json(&register_body("jane@x.com")).await;
        let first = mailer.wait_for("jane@x.com").await;
        let raw = token_from_link(&first, "/verify-email/");

        server
            .post("/api/auth/resend-verification")
            .json(&json!({ "email": "jane@x.com" }))
            .await
            .assert_status_ok();
        mailer.wait_for_count(2).await;

        // The resend replaced the original token.
        server
            .get(&format!("/api/auth/verify-email/{raw}"))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        let fresh = token_from_link(&mailer.last_to("jane@x.com").unwrap(), "/verify-email/");
        server
            .get(&format!("/api/auth/verify-email/{fresh}"))
            .await
            .assert_status_ok();

        let again = server
            .post("/api/auth/resend-verification")
            .json(&json!({ "email": "jane@x.com" }))
            .await;
        again.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(again.json::<Value>()["message"], "This email is already verified");
    }

    #[tokio::test]
    async fn test_registration_survives_mail_failure() {
        let server = create_test_server(create_test_state(create_test_config(), Arc::new(FailingMailer)));
        server
            .post("/api/auth/register")
            .json(&register_body("jane@x.com"))
            .await
            .assert_status(StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_register_rejects_password_over_max_length() {
        let (server, _mailer) = create_test_app();
        let mut body = register_body("jane@x.com");
        let password = format!("P@ssw0rd{}", "a".repeat(10_000));
        body["password"] = json!(password);
        body["confirmPassword"] = json!(password);

        let response = server.post("/api/auth/register").json(&body).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["message"], "Password must be no more than 128 characters");
    }
}
