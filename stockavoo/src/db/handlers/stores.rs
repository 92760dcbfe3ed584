//! Postgres repository for stores.

use crate::types::{StoreId, UserId, abbrev_uuid};
use crate::{
    api::models::stores::{Address, Currency, OpeningHours},
    db::{
        errors::{DbError, Result},
        handlers::repository::StoreRepository,
        models::stores::{StoreCreateDBRequest, StoreDBResponse, StoreFilter, StoreUpdateDBRequest},
    },
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};
use tracing::instrument;
use uuid::Uuid;

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Store {
    pub id: StoreId,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: String,
    pub address: Json<Address>,
    pub currency: Currency,
    pub tax_rate: f64,
    pub is_active: bool,
    pub created_by: UserId,
    pub opening_hours: Option<Json<OpeningHours>>,
    pub description: Option<String>,
    pub logo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Store> for StoreDBResponse {
    fn from(store: Store) -> Self {
        Self {
            id: store.id,
            name: store.name,
            email: store.email,
            phone_number: store.phone_number,
            address: store.address.0,
            currency: store.currency,
            tax_rate: store.tax_rate,
            is_active: store.is_active,
            created_by: store.created_by,
            opening_hours: store.opening_hours.map(|h| h.0),
            description: store.description,
            logo: store.logo,
            created_at: store.created_at,
            updated_at: store.updated_at,
        }
    }
}

pub struct Stores {
    db: PgPool,
}

impl Stores {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl StoreRepository for Stores {
    #[instrument(skip(self, request), fields(created_by = %abbrev_uuid(&request.created_by)), err)]
    async fn create(&self, request: &StoreCreateDBRequest) -> Result<StoreDBResponse> {
        let store = sqlx::query_as::<_, Store>(
            r#"
            INSERT INTO stores (
                id, name, email, phone_number, address, currency, tax_rate,
                created_by, opening_hours, description, logo
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.phone_number)
        .bind(Json(&request.address))
        .bind(request.currency)
        .bind(request.tax_rate)
        .bind(request.created_by)
        .bind(request.opening_hours.as_ref().map(Json))
        .bind(&request.description)
        .bind(&request.logo)
        .fetch_one(&self.db)
        .await?;

        Ok(store.into())
    }

    #[instrument(skip(self), fields(store_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&self, id: StoreId) -> Result<Option<StoreDBResponse>> {
        let store = sqlx::query_as::<_, Store>("SELECT * FROM stores WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(store.map(Into::into))
    }

    #[instrument(skip(self, filter), fields(created_by = %abbrev_uuid(&filter.created_by)), err)]
    async fn list(&self, filter: &StoreFilter) -> Result<Vec<StoreDBResponse>> {
        let stores = sqlx::query_as::<_, Store>(
            "SELECT * FROM stores WHERE created_by = $1 AND (NOT $2 OR is_active) ORDER BY created_at DESC",
        )
        .bind(filter.created_by)
        .bind(filter.active_only)
        .fetch_all(&self.db)
        .await?;

        Ok(stores.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, request), fields(store_id = %abbrev_uuid(&id)), err)]
    async fn update(&self, id: StoreId, request: &StoreUpdateDBRequest) -> Result<StoreDBResponse> {
        let store = sqlx::query_as::<_, Store>(
            r#"
            UPDATE stores SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                phone_number = COALESCE($4, phone_number),
                address = COALESCE($5, address),
                currency = COALESCE($6, currency),
                tax_rate = COALESCE($7, tax_rate),
                opening_hours = COALESCE($8, opening_hours),
                description = COALESCE($9, description),
                logo = COALESCE($10, logo),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.phone_number)
        .bind(request.address.as_ref().map(Json))
        .bind(request.currency)
        .bind(request.tax_rate)
        .bind(request.opening_hours.as_ref().map(Json))
        .bind(&request.description)
        .bind(&request.logo)
        .fetch_optional(&self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(store.into())
    }

    #[instrument(skip(self), fields(store_id = %abbrev_uuid(&id)), err)]
    async fn deactivate(&self, id: StoreId) -> Result<bool> {
        let result = sqlx::query("UPDATE stores SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
