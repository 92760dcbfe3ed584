//! API request/response models for stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use validator::Validate;

use super::validation::{ValidatedRequest, trim_to_none};
use crate::db::models::stores::StoreDBResponse;
use crate::errors::Error;
use crate::types::{StoreId, UserId};

pub const DEFAULT_COUNTRY: &str = "Nigeria";
pub const MAX_BULK_STORES: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "VARCHAR")]
pub enum Currency {
    #[default]
    NGN,
    USD,
    GBP,
    EUR,
}

impl Currency {
    pub const ALL: [Currency; 4] = [Currency::NGN, Currency::USD, Currency::GBP, Currency::EUR];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::NGN => "NGN",
            Currency::USD => "USD",
            Currency::GBP => "GBP",
            Currency::EUR => "EUR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

impl Address {
    /// Trim every part and fill in the default country.
    pub fn normalized(self) -> Self {
        Self {
            street: trim_to_none(self.street),
            city: trim_to_none(self.city),
            state: trim_to_none(self.state),
            country: trim_to_none(self.country).or_else(|| Some(DEFAULT_COUNTRY.to_string())),
            postal_code: trim_to_none(self.postal_code),
        }
    }

    /// Street, city, state and country, skipping empty parts.
    pub fn full_address(&self) -> String {
        [&self.street, &self.city, &self.state, &self.country]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DayHours {
    pub open: Option<String>,
    pub close: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OpeningHours {
    pub monday: Option<DayHours>,
    pub tuesday: Option<DayHours>,
    pub wednesday: Option<DayHours>,
    pub thursday: Option<DayHours>,
    pub friday: Option<DayHours>,
    pub saturday: Option<DayHours>,
    pub sunday: Option<DayHours>,
}

/// Body of `POST /stores`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreCreate {
    #[validate(length(max = 100, message = "Store name cannot exceed 100 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<Address>,
    #[validate(range(min = 0.0, message = "Tax rate cannot be negative"))]
    pub tax_rate: Option<f64>,
    pub currency: Option<Currency>,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    pub description: Option<String>,
    pub opening_hours: Option<OpeningHours>,
    pub logo: Option<String>,
}

impl ValidatedRequest for StoreCreate {
    const FIELDS: &'static [&'static str] = &["name", "email", "phone_number", "tax_rate", "description"];

    fn normalize(&mut self) {
        self.name = trim_to_none(self.name.take());
        self.email = trim_to_none(self.email.take()).map(|e| e.to_lowercase());
        self.phone_number = trim_to_none(self.phone_number.take());
        self.description = trim_to_none(self.description.take());
        self.logo = trim_to_none(self.logo.take());
    }

    fn check(&self) -> Result<(), Error> {
        if self.name.is_none() || self.phone_number.is_none() {
            return Err(Error::BadRequest {
                message: "Please provide store name and phone number".to_string(),
            });
        }
        Ok(())
    }
}

/// Body of `PUT /stores/{id}`. Absent fields are left unchanged; `address` and
/// `openingHours` replace the stored value wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreUpdate {
    #[validate(length(max = 100, message = "Store name cannot exceed 100 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<Address>,
    #[validate(range(min = 0.0, message = "Tax rate cannot be negative"))]
    pub tax_rate: Option<f64>,
    pub currency: Option<Currency>,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    pub description: Option<String>,
    pub opening_hours: Option<OpeningHours>,
    pub logo: Option<String>,
}

impl ValidatedRequest for StoreUpdate {
    const FIELDS: &'static [&'static str] = &["name", "email", "phone_number", "tax_rate", "description"];

    fn normalize(&mut self) {
        self.name = trim_to_none(self.name.take());
        self.email = trim_to_none(self.email.take()).map(|e| e.to_lowercase());
        self.phone_number = trim_to_none(self.phone_number.take());
        self.description = trim_to_none(self.description.take());
        self.logo = trim_to_none(self.logo.take());
        self.address = self.address.take().map(Address::normalized);
    }
}

/// Body of `POST /stores/bulk`. Rows stay untyped until each is processed so that one
/// malformed row fails alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct BulkStoresRequest {
    #[schema(value_type = Option<Vec<BulkStoreRow>>)]
    pub stores: Option<Vec<serde_json::Value>>,
}

impl ValidatedRequest for BulkStoresRequest {
    const FIELDS: &'static [&'static str] = &["stores"];

    fn check(&self) -> Result<(), Error> {
        match &self.stores {
            None => Err(Error::BadRequest {
                message: "Please provide an array of stores".to_string(),
            }),
            Some(rows) if rows.is_empty() => Err(Error::BadRequest {
                message: "Please provide an array of stores".to_string(),
            }),
            Some(rows) if rows.len() > MAX_BULK_STORES => Err(Error::BadRequest {
                message: format!("Maximum {MAX_BULK_STORES} stores can be created at once"),
            }),
            Some(_) => Ok(()),
        }
    }
}

/// One row of a bulk import: flat store fields as they come out of a spreadsheet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkStoreRow {
    #[validate(length(max = 100, message = "Store name cannot exceed 100 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: Option<String>,
    pub phone_number: Option<String>,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    pub description: Option<String>,
    #[validate(range(min = 0.0, message = "Tax rate cannot be negative"))]
    pub tax_rate: Option<f64>,
    pub currency: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

impl BulkStoreRow {
    /// Turn a raw row into a create request, or the message explaining why it cannot be.
    pub fn into_store(value: serde_json::Value) -> Result<StoreCreate, String> {
        let row: BulkStoreRow = serde_json::from_value(value).map_err(|e| format!("Invalid store data: {e}"))?;

        let name = trim_to_none(row.name.clone());
        let phone_number = trim_to_none(row.phone_number.clone());
        if name.is_none() || phone_number.is_none() {
            return Err("Store name and phone number are required".to_string());
        }

        if let Err(errors) = row.validate() {
            let messages = super::validation::field_errors(&errors, &["name", "email", "description", "tax_rate"]);
            return Err(messages
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join(", "));
        }

        let currency = match trim_to_none(row.currency) {
            None => Currency::default(),
            Some(code) => Currency::parse(&code.to_uppercase())
                .ok_or_else(|| format!("Invalid currency '{code}'. Must be one of: NGN, USD, GBP, EUR"))?,
        };

        Ok(StoreCreate {
            name,
            email: trim_to_none(row.email).map(|e| e.to_lowercase()),
            phone_number,
            address: Some(Address {
                street: row.street,
                city: row.city,
                state: row.state,
                country: row.country,
                postal_code: row.postal_code,
            }),
            tax_rate: Some(row.tax_rate.unwrap_or(0.0)),
            currency: Some(currency),
            description: trim_to_none(row.description),
            opening_hours: None,
            logo: None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: StoreId,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: String,
    pub address: Address,
    pub full_address: String,
    pub currency: Currency,
    pub tax_rate: f64,
    pub is_active: bool,
    #[schema(value_type = String, format = "uuid")]
    pub created_by: UserId,
    pub opening_hours: Option<OpeningHours>,
    pub description: Option<String>,
    pub logo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StoreDBResponse> for StoreResponse {
    fn from(store: StoreDBResponse) -> Self {
        let full_address = store.address.full_address();
        Self {
            id: store.id,
            name: store.name,
            email: store.email,
            phone_number: store.phone_number,
            address: store.address,
            full_address,
            currency: store.currency,
            tax_rate: store.tax_rate,
            is_active: store.is_active,
            created_by: store.created_by,
            opening_hours: store.opening_hours,
            description: store.description,
            logo: store.logo,
            created_at: store.created_at,
            updated_at: store.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkCreated {
    pub row: usize,
    pub store: StoreResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkFailed {
    pub row: usize,
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkStoresResult {
    pub successful: Vec<BulkCreated>,
    pub failed: Vec<BulkFailed>,
    pub summary: BulkSummary,
}

impl BulkStoresResult {
    pub fn new(total: usize, successful: Vec<BulkCreated>, failed: Vec<BulkFailed>) -> Self {
        let summary = BulkSummary {
            total,
            successful: successful.len(),
            failed: failed.len(),
        };
        Self {
            successful,
            failed,
            summary,
        }
    }

    pub fn message(&self) -> String {
        format!(
            "Created {} store(s). {} failed.",
            self.summary.successful, self.summary.failed
        )
    }
}
