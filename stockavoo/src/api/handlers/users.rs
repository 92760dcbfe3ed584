use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;

use crate::{
    AppState,
    api::models::{
        ApiResponse, SuccessMessage,
        users::{ChangePassword, InviteUser, ProfileUpdate, Role, UserInvite, UserResponse, UserUpdate},
        validation::ValidatedJson,
    },
    auth::{
        current_user::{CurrentUser, VerifiedUser},
        permissions::{RequiresOwnership, RequiresPermission, RequiresRole, operation, resource, roles},
    },
    db::models::accounts::{AccountDBResponse, AccountFilter, AccountUpdateDBRequest},
    errors::Error,
    types::{UserId, abbrev_uuid},
};

async fn load_account(state: &AppState, id: UserId) -> Result<AccountDBResponse, Error> {
    state.storage.accounts.get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        message: "User not found".to_string(),
    })
}

/// Reject `caller` acting on `target` unless they created it. Acting on yourself and on
/// accounts nobody created (self-registered owners) is always allowed here.
fn ensure_creator(caller: &CurrentUser, target: &AccountDBResponse, message: &str) -> Result<(), Error> {
    if target.id == caller.id {
        return Ok(());
    }
    match target.created_by {
        Some(creator) if creator != caller.id => Err(Error::Forbidden {
            message: message.to_string(),
        }),
        _ => Ok(()),
    }
}

/// List the active accounts created by the caller, newest first
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    responses(
        (status = 200, description = "Accounts created by the caller", body = ApiResponse<Vec<UserResponse>>),
        (status = 403, description = "Requires owner or manager"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    user: RequiresRole<roles::OwnerOrManager>,
) -> Result<Json<ApiResponse<Vec<UserResponse>>>, Error> {
    let filter = AccountFilter {
        created_by: Some(user.id),
        active_only: true,
    };
    let accounts = state.storage.accounts.list(&filter).await?;
    Ok(Json(ApiResponse::list(accounts.into_iter().map(UserResponse::from).collect())))
}

/// Invite a new account. The invitee receives a link to set their password.
#[utoipa::path(
    post,
    path = "/users",
    request_body = UserInvite,
    tag = "users",
    responses(
        (status = 201, description = "Account created and invitation sent", body = ApiResponse<UserResponse>),
        (status = 400, description = "Missing fields, invalid role or email already in use"),
        (status = 403, description = "Requires a verified owner"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn invite_user(
    State(state): State<AppState>,
    owner: RequiresRole<roles::OwnerOnly>,
    _can_create: RequiresPermission<resource::Users, operation::Create>,
    _verified: VerifiedUser,
    ValidatedJson(body): ValidatedJson<UserInvite>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>), Error> {
    let invite = InviteUser::try_from(body)?;
    let account = state.lifecycle().create_invited_user(invite, owner.id).await?;
    let message = format!("User invited successfully. Setup email sent to {}", account.email);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(message, UserResponse::from(account))),
    ))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    params(("id" = String, Path, description = "Account ID (UUID)")),
    responses(
        (status = 200, description = "The account", body = ApiResponse<UserResponse>),
        (status = 403, description = "Not your account"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    access: RequiresOwnership,
) -> Result<Json<ApiResponse<UserResponse>>, Error> {
    let account = load_account(&state, access.target).await?;
    ensure_creator(&access.user, &account, "You do not have permission to view this user")?;
    Ok(Json(ApiResponse::data(UserResponse::from(account))))
}

#[utoipa::path(
    put,
    path = "/users/{id}",
    request_body = UserUpdate,
    tag = "users",
    params(("id" = String, Path, description = "Account ID (UUID)")),
    responses(
        (status = 200, description = "Account updated", body = ApiResponse<UserResponse>),
        (status = 403, description = "Not allowed to change this account or these fields"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    access: RequiresOwnership,
    ValidatedJson(update): ValidatedJson<UserUpdate>,
) -> Result<Json<ApiResponse<UserResponse>>, Error> {
    let account = load_account(&state, access.target).await?;
    ensure_creator(&access.user, &account, "You can only update users you created")?;

    if access.user.role != Role::Owner && (update.role.is_some() || update.is_active.is_some()) {
        return Err(Error::Forbidden {
            message: "Only business owners can change user roles or active status".to_string(),
        });
    }

    let updated = state
        .storage
        .accounts
        .update(access.target, &AccountUpdateDBRequest::from(update))
        .await?;
    Ok(Json(ApiResponse::with_message("User updated successfully", UserResponse::from(updated))))
}

/// Deactivate an account. Accounts are never hard-deleted.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    params(("id" = String, Path, description = "Account ID (UUID)")),
    responses(
        (status = 200, description = "Account deactivated", body = SuccessMessage),
        (status = 400, description = "Cannot delete your own account"),
        (status = 403, description = "Requires owner, or account created by someone else"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    owner: RequiresRole<roles::OwnerOnly>,
    _can_delete: RequiresPermission<resource::Users, operation::Delete>,
    Path(id): Path<UserId>,
) -> Result<Json<SuccessMessage>, Error> {
    if id == owner.id {
        return Err(Error::BadRequest {
            message: "You cannot delete your own account".to_string(),
        });
    }
    let account = load_account(&state, id).await?;
    ensure_creator(&owner, &account, "You can only delete users you created")?;

    state
        .storage
        .accounts
        .update(id, &AccountUpdateDBRequest::deactivate())
        .await?;
    info!(user_id = %abbrev_uuid(&id), by = %abbrev_uuid(&owner.id), "Deactivated account");
    Ok(Json(SuccessMessage::new("User deactivated successfully")))
}

#[utoipa::path(
    get,
    path = "/users/me",
    tag = "users",
    responses(
        (status = 200, description = "The caller's account", body = ApiResponse<UserResponse>),
        (status = 401, description = "Not logged in"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_profile(current_user: CurrentUser) -> Json<ApiResponse<UserResponse>> {
    Json(ApiResponse::data(UserResponse::from(current_user.0)))
}

#[utoipa::path(
    put,
    path = "/users/me",
    request_body = ProfileUpdate,
    tag = "users",
    responses(
        (status = 200, description = "Profile updated", body = ApiResponse<UserResponse>),
        (status = 400, description = "Validation failed"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ValidatedJson(update): ValidatedJson<ProfileUpdate>,
) -> Result<Json<ApiResponse<UserResponse>>, Error> {
    let request = AccountUpdateDBRequest {
        full_name: update.full_name,
        phone_number: update.phone_number,
        profile_picture: update.profile_picture,
        ..Default::default()
    };
    let updated = state.storage.accounts.update(current_user.id, &request).await?;
    Ok(Json(ApiResponse::with_message("Profile updated successfully", UserResponse::from(updated))))
}

#[utoipa::path(
    put,
    path = "/users/me/password",
    request_body = ChangePassword,
    tag = "users",
    responses(
        (status = 200, description = "Password changed", body = SuccessMessage),
        (status = 400, description = "Current password is incorrect or new password is too weak"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ValidatedJson(body): ValidatedJson<ChangePassword>,
) -> Result<Json<SuccessMessage>, Error> {
    state
        .lifecycle()
        .change_password(
            &current_user,
            body.current_password.unwrap_or_default(),
            body.new_password.unwrap_or_default(),
        )
        .await?;
    Ok(Json(SuccessMessage::new("Password changed successfully")))
}
