//! OpenAPI documentation for the `/api` surface, served by Scalar at `/api/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api::{
    handlers,
    models::{SuccessMessage, auth, stores, users},
};

/// Bearer session token issued by login, registration and the token flows.
struct SessionSecurityAddon;

impl Modify for SessionSecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token returned in `data.token` by the authentication endpoints:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stockavoo API",
        description = "Accounts, authentication and store management for the Stockavoo inventory platform."
    ),
    servers((url = "/api")),
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::verify_email,
        handlers::auth::resend_verification,
        handlers::auth::forgot_password,
        handlers::auth::reset_password,
        handlers::auth::setup_password,
        handlers::auth::me,
        handlers::federated::google_start,
        handlers::federated::google_callback,
        handlers::federated::facebook_start,
        handlers::federated::facebook_callback,
        handlers::users::list_users,
        handlers::users::invite_user,
        handlers::users::get_user,
        handlers::users::update_user,
        handlers::users::delete_user,
        handlers::users::get_profile,
        handlers::users::update_profile,
        handlers::users::change_password,
        handlers::stores::list_stores,
        handlers::stores::create_store,
        handlers::stores::bulk_create_stores,
        handlers::stores::get_store,
        handlers::stores::update_store,
        handlers::stores::delete_store,
    ),
    components(schemas(
        auth::RegisterRequest,
        auth::LoginRequest,
        auth::EmailRequest,
        auth::ResetPasswordRequest,
        auth::SetupPasswordRequest,
        auth::AuthPayload,
        auth::UserPayload,
        auth::StatusMessage,
        users::Role,
        users::AuthProvider,
        users::UserResponse,
        users::UserInvite,
        users::UserUpdate,
        users::ProfileUpdate,
        users::ChangePassword,
        stores::StoreCreate,
        stores::StoreUpdate,
        stores::StoreResponse,
        stores::BulkStoresRequest,
        stores::BulkStoreRow,
        stores::BulkStoresResult,
        SuccessMessage,
    )),
    modifiers(&SessionSecurityAddon),
    tags(
        (name = "authentication", description = "Registration, login and email token flows"),
        (name = "users", description = "Account invites, profiles and staff management"),
        (name = "stores", description = "Store management"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_lists_every_route() {
        let spec = ApiDoc::openapi();
        for path in [
            "/auth/register",
            "/auth/login",
            "/auth/reset-password/{token}",
            "/auth/google/callback",
            "/users/{id}",
            "/users/me/password",
            "/stores/bulk",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
        assert!(spec.components.unwrap().security_schemes.contains_key("BearerAuth"));
    }
}
