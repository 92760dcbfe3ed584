//! Store management. Every route is owner-only and scoped to stores the caller created.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{debug, info};

use crate::{
    AppState,
    api::models::{
        ApiResponse, SuccessMessage,
        stores::{
            BulkCreated, BulkFailed, BulkStoreRow, BulkStoresRequest, BulkStoresResult, StoreCreate, StoreResponse,
            StoreUpdate,
        },
        validation::ValidatedJson,
    },
    auth::{
        current_user::CurrentUser,
        permissions::{RequiresRole, roles},
    },
    db::models::stores::{StoreCreateDBRequest, StoreDBResponse, StoreFilter, StoreUpdateDBRequest},
    errors::Error,
    types::{StoreId, abbrev_uuid},
};

type Owner = RequiresRole<roles::OwnerOnly>;

async fn load_owned_store(state: &AppState, owner: &CurrentUser, id: StoreId, denied: &str) -> Result<StoreDBResponse, Error> {
    // Deactivated stores read as absent.
    let store = state
        .storage
        .stores
        .get_by_id(id)
        .await?
        .filter(|store| store.is_active)
        .ok_or_else(|| Error::NotFound {
            message: "Store not found".to_string(),
        })?;
    if store.created_by != owner.id {
        return Err(Error::Forbidden {
            message: denied.to_string(),
        });
    }
    Ok(store)
}

#[utoipa::path(
    get,
    path = "/stores",
    tag = "stores",
    responses(
        (status = 200, description = "The caller's active stores, newest first", body = ApiResponse<Vec<StoreResponse>>),
        (status = 403, description = "Requires owner"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_stores(State(state): State<AppState>, owner: Owner) -> Result<Json<ApiResponse<Vec<StoreResponse>>>, Error> {
    let filter = StoreFilter {
        created_by: owner.id,
        active_only: true,
    };
    let stores = state.storage.stores.list(&filter).await?;
    Ok(Json(ApiResponse::list(stores.into_iter().map(StoreResponse::from).collect())))
}

#[utoipa::path(
    post,
    path = "/stores",
    request_body = StoreCreate,
    tag = "stores",
    responses(
        (status = 201, description = "Store created", body = ApiResponse<StoreResponse>),
        (status = 400, description = "Missing name or phone number, or validation failed"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_store(
    State(state): State<AppState>,
    owner: Owner,
    ValidatedJson(create): ValidatedJson<StoreCreate>,
) -> Result<(StatusCode, Json<ApiResponse<StoreResponse>>), Error> {
    let store = state
        .storage
        .stores
        .create(&StoreCreateDBRequest::new(owner.id, create))
        .await?;
    info!(store_id = %abbrev_uuid(&store.id), "Created store");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("Store created successfully", StoreResponse::from(store))),
    ))
}

/// Create up to 50 stores at once. Rows succeed or fail independently.
#[utoipa::path(
    post,
    path = "/stores/bulk",
    request_body = BulkStoresRequest,
    tag = "stores",
    responses(
        (status = 201, description = "Every row was created", body = ApiResponse<BulkStoresResult>),
        (status = 207, description = "Some rows failed", body = ApiResponse<BulkStoresResult>),
        (status = 400, description = "Missing, empty or oversized stores array"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn bulk_create_stores(
    State(state): State<AppState>,
    owner: Owner,
    ValidatedJson(request): ValidatedJson<BulkStoresRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BulkStoresResult>>), Error> {
    let rows = request.stores.unwrap_or_default();
    let total = rows.len();
    let mut successful = Vec::new();
    let mut failed = Vec::new();

    for (index, data) in rows.into_iter().enumerate() {
        let row = index + 1;
        let create = match BulkStoreRow::into_store(data.clone()) {
            Ok(create) => create,
            Err(error) => {
                failed.push(BulkFailed { row, data, error });
                continue;
            }
        };
        match state
            .storage
            .stores
            .create(&StoreCreateDBRequest::new(owner.id, create))
            .await
        {
            Ok(store) => successful.push(BulkCreated {
                row,
                store: StoreResponse::from(store),
            }),
            Err(e) => {
                let error = Error::from(e);
                debug!(row, error = %error, "Bulk store row failed");
                failed.push(BulkFailed {
                    row,
                    data,
                    error: error.user_message(),
                });
            }
        }
    }

    let result = BulkStoresResult::new(total, successful, failed);
    info!(total, created = result.summary.successful, failed = result.summary.failed, "Bulk store import");
    let status = if result.failed.is_empty() {
        StatusCode::CREATED
    } else {
        StatusCode::MULTI_STATUS
    };
    Ok((status, Json(ApiResponse::with_message(result.message(), result))))
}

#[utoipa::path(
    get,
    path = "/stores/{id}",
    tag = "stores",
    params(("id" = String, Path, description = "Store ID (UUID)")),
    responses(
        (status = 200, description = "The store", body = ApiResponse<StoreResponse>),
        (status = 403, description = "Store belongs to someone else"),
        (status = 404, description = "Store not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_store(
    State(state): State<AppState>,
    owner: Owner,
    Path(id): Path<StoreId>,
) -> Result<Json<ApiResponse<StoreResponse>>, Error> {
    let store = load_owned_store(&state, &owner, id, "You do not have permission to view this store").await?;
    Ok(Json(ApiResponse::data(StoreResponse::from(store))))
}

#[utoipa::path(
    put,
    path = "/stores/{id}",
    request_body = StoreUpdate,
    tag = "stores",
    params(("id" = String, Path, description = "Store ID (UUID)")),
    responses(
        (status = 200, description = "Store updated", body = ApiResponse<StoreResponse>),
        (status = 403, description = "Store belongs to someone else"),
        (status = 404, description = "Store not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_store(
    State(state): State<AppState>,
    owner: Owner,
    Path(id): Path<StoreId>,
    ValidatedJson(update): ValidatedJson<StoreUpdate>,
) -> Result<Json<ApiResponse<StoreResponse>>, Error> {
    load_owned_store(&state, &owner, id, "You can only update stores you created").await?;
    let store = state
        .storage
        .stores
        .update(id, &StoreUpdateDBRequest::from(update))
        .await?;
    Ok(Json(ApiResponse::with_message("Store updated successfully", StoreResponse::from(store))))
}

/// Deactivate a store. Stores are never hard-deleted.
#[utoipa::path(
    delete,
    path = "/stores/{id}",
    tag = "stores",
    params(("id" = String, Path, description = "Store ID (UUID)")),
    responses(
        (status = 200, description = "Store deactivated", body = SuccessMessage),
        (status = 403, description = "Store belongs to someone else"),
        (status = 404, description = "Store not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_store(
    State(state): State<AppState>,
    owner: Owner,
    Path(id): Path<StoreId>,
) -> Result<Json<SuccessMessage>, Error> {
    load_owned_store(&state, &owner, id, "You can only delete stores you created").await?;
    if !state.storage.stores.deactivate(id).await? {
        return Err(Error::NotFound {
            message: "Store not found".to_string(),
        });
    }
    info!(store_id = %abbrev_uuid(&id), "Deactivated store");
    Ok(Json(SuccessMessage::new("Store deactivated successfully")))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestApp;
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    fn store_body(name: &str) -> Value {
        json!({
            "name": name,
            "phoneNumber": "+2348012345678",
            "address": { "street": "1 Marina", "city": "Lagos" },
            "currency": "NGN",
            "taxRate": 7.5
        })
    }

    #[tokio::test]
    async fn test_store_crud() {
        let app = TestApp::new();
        let owner = app.register_owner("owner@x.com").await;

        let created = app
            .server
            .post("/api/stores")
            .authorization_bearer(&owner)
            .json(&store_body("Main Branch"))
            .await;
        created.assert_status(StatusCode::CREATED);
        let body: Value = created.json();
        assert_eq!(body["message"], "Store created successfully");
        assert_eq!(body["data"]["address"]["country"], "Nigeria");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let updated = app
            .server
            .put(&format!("/api/stores/{id}"))
            .authorization_bearer(&owner)
            .json(&json!({ "name": "Flagship" }))
            .await;
        updated.assert_status_ok();
        assert_eq!(updated.json::<Value>()["data"]["name"], "Flagship");

        let deleted = app
            .server
            .delete(&format!("/api/stores/{id}"))
            .authorization_bearer(&owner)
            .await;
        deleted.assert_status_ok();
        assert_eq!(deleted.json::<Value>()["message"], "Store deactivated successfully");

        let list: Value = app.server.get("/api/stores").authorization_bearer(&owner).await.json();
        assert_eq!(list["count"], 0);
    }

    #[tokio::test]
    async fn test_deactivated_store_is_not_found() {
        let app = TestApp::new();
        let owner = app.register_owner("owner@x.com").await;
        let created: Value = app
            .server
            .post("/api/stores")
            .authorization_bearer(&owner)
            .json(&store_body("Closing Soon"))
            .await
            .json();
        let path = format!("/api/stores/{}", created["data"]["id"].as_str().unwrap());

        app.server
            .delete(&path)
            .authorization_bearer(&owner)
            .await
            .assert_status_ok();

        let read = app.server.get(&path).authorization_bearer(&owner).await;
        read.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(read.json::<Value>()["message"], "Store not found");
        app.server
            .put(&path)
            .authorization_bearer(&owner)
            .json(&json!({ "name": "Zombie" }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        app.server
            .delete(&path)
            .authorization_bearer(&owner)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_requires_name_and_phone() {
        let app = TestApp::new();
        let owner = app.register_owner("owner@x.com").await;
        let response = app
            .server
            .post("/api/stores")
            .authorization_bearer(&owner)
            .json(&json!({ "name": "No Phone" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["message"], "Please provide store name and phone number");
    }

    #[tokio::test]
    async fn test_stores_are_private_to_their_creator() {
        let app = TestApp::new();
        let alice = app.register_owner("alice@x.com").await;
        let mallory = app.register_owner("mallory@x.com").await;

        let created: Value = app
            .server
            .post("/api/stores")
            .authorization_bearer(&alice)
            .json(&store_body("Alice Store"))
            .await
            .json();
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let view = app
            .server
            .get(&format!("/api/stores/{id}"))
            .authorization_bearer(&mallory)
            .await;
        view.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(view.json::<Value>()["message"], "You do not have permission to view this store");

        let list: Value = app.server.get("/api/stores").authorization_bearer(&mallory).await.json();
        assert_eq!(list["count"], 0);
    }

    #[tokio::test]
    async fn test_clerk_cannot_manage_stores() {
        let app = TestApp::new();
        let owner = app.register_owner("owner@x.com").await;
        let (_id, clerk) = app.invite_and_setup(&owner, "clerk@x.com", "clerk").await;

        let response = app.server.get("/api/stores").authorization_bearer(&clerk).await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(
            response.json::<Value>()["message"],
            "Access denied. This action requires one of these roles: owner"
        );
    }

    #[tokio::test]
    async fn test_bulk_create_reports_each_row() {
        let app = TestApp::new();
        let owner = app.register_owner("owner@x.com").await;

        let response = app
            .server
            .post("/api/stores/bulk")
            .authorization_bearer(&owner)
            .json(&json!({ "stores": [
                { "name": "Row One", "phoneNumber": "+2348012345678", "city": "Lagos" },
                { "name": "Missing Phone" },
                { "name": "Bad Currency", "phoneNumber": "+2348012345678", "currency": "JPY" },
            ]}))
            .await;

        response.assert_status(StatusCode::MULTI_STATUS);
        let body: Value = response.json();
        assert_eq!(body["message"], "Created 1 store(s). 2 failed.");
        assert_eq!(body["data"]["summary"]["total"], 3);
        assert_eq!(body["data"]["successful"][0]["row"], 1);
        assert_eq!(body["data"]["failed"][0]["row"], 2);
        assert_eq!(body["data"]["failed"][0]["error"], "Store name and phone number are required");
        assert_eq!(body["data"]["failed"][1]["row"], 3);
    }

    #[tokio::test]
    async fn test_bulk_create_all_rows_succeed() {
        let app = TestApp::new();
        let owner = app.register_owner("owner@x.com").await;

        let response = app
            .server
            .post("/api/stores/bulk")
            .authorization_bearer(&owner)
            .json(&json!({ "stores": [
                { "name": "One", "phoneNumber": "+2348012345678" },
                { "name": "Two", "phoneNumber": "+2348012345679" },
            ]}))
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json::<Value>()["message"], "Created 2 store(s). 0 failed.");
    }

    #[tokio::test]
    async fn test_bulk_rejects_empty_and_oversized_batches() {
        let app = TestApp::new();
        let owner = app.register_owner("owner@x.com").await;

        let empty = app
            .server
            .post("/api/stores/bulk")
            .authorization_bearer(&owner)
            .json(&json!({ "stores": [] }))
            .await;
        empty.assert_status(StatusCode::BAD_REQUEST);

        let rows: Vec<Value> = (0..51)
            .map(|i| json!({ "name": format!("Store {i}"), "phoneNumber": "+2348012345678" }))
            .collect();
        let oversized = app
            .server
            .post("/api/stores/bulk")
            .authorization_bearer(&owner)
            .json(&json!({ "stores": rows }))
            .await;
        oversized.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            oversized.json::<Value>()["message"],
            "Maximum 50 stores can be created at once"
        );
    }
}
