//! Database models for stores.

use chrono::{DateTime, Utc};

use crate::api::models::stores::{Address, Currency, OpeningHours, StoreCreate, StoreUpdate};
use crate::types::{StoreId, UserId};

/// Database request for creating a new store
#[derive(Debug, Clone)]
pub struct StoreCreateDBRequest {
    pub created_by: UserId,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: String,
    pub address: Address,
    pub currency: Currency,
    pub tax_rate: f64,
    pub opening_hours: Option<OpeningHours>,
    pub description: Option<String>,
    pub logo: Option<String>,
}

impl StoreCreateDBRequest {
    /// `create` must already have passed validation, which guarantees name and phone number.
    pub fn new(created_by: UserId, create: StoreCreate) -> Self {
        Self {
            created_by,
            name: create.name.unwrap_or_default(),
            email: create.email,
            phone_number: create.phone_number.unwrap_or_default(),
            address: create.address.unwrap_or_default().normalized(),
            currency: create.currency.unwrap_or_default(),
            tax_rate: create.tax_rate.unwrap_or(0.0),
            opening_hours: create.opening_hours,
            description: create.description,
            logo: create.logo,
        }
    }
}

/// Database request for updating a store. `None` leaves a column unchanged.
#[derive(Debug, Clone, Default)]
pub struct StoreUpdateDBRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<Address>,
    pub currency: Option<Currency>,
    pub tax_rate: Option<f64>,
    pub opening_hours: Option<OpeningHours>,
    pub description: Option<String>,
    pub logo: Option<String>,
}

impl From<StoreUpdate> for StoreUpdateDBRequest {
    fn from(update: StoreUpdate) -> Self {
        Self {
            name: update.name,
            email: update.email,
            phone_number: update.phone_number,
            address: update.address,
            currency: update.currency,
            tax_rate: update.tax_rate,
            opening_hours: update.opening_hours,
            description: update.description,
            logo: update.logo,
        }
    }
}

/// Filter for listing stores
#[derive(Debug, Clone)]
pub struct StoreFilter {
    pub created_by: UserId,
    pub active_only: bool,
}

/// Database response for a store
#[derive(Debug, Clone)]
pub struct StoreDBResponse {
    pub id: StoreId,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: String,
    pub address: Address,
    pub currency: Currency,
    pub tax_rate: f64,
    pub is_active: bool,
    pub created_by: UserId,
    pub opening_hours: Option<OpeningHours>,
    pub description: Option<String>,
    pub logo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoreDBResponse {
    /// Apply a partial update in memory.
    pub fn apply(&mut self, update: &StoreUpdateDBRequest, now: DateTime<Utc>) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(email) = &update.email {
            self.email = Some(email.clone());
        }
        if let Some(phone_number) = &update.phone_number {
            self.phone_number = phone_number.clone();
        }
        if let Some(address) = &update.address {
            self.address = address.clone();
        }
        if let Some(currency) = update.currency {
            self.currency = currency;
        }
        if let Some(tax_rate) = update.tax_rate {
            self.tax_rate = tax_rate;
        }
        if let Some(opening_hours) = &update.opening_hours {
            self.opening_hours = Some(opening_hours.clone());
        }
        if let Some(description) = &update.description {
            self.description = Some(description.clone());
        }
        if let Some(logo) = &update.logo {
            self.logo = Some(logo.clone());
        }
        self.updated_at = now;
    }
}
