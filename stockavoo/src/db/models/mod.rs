//! Database record models.
//!
//! These structs are what repositories accept and return. They are distinct from the API
//! models: an [`accounts::AccountDBResponse`] carries the password hash and outstanding
//! token digests, and only becomes client-visible through `UserResponse`.
//!
//! - [`accounts`]: accounts, single-use token slots and redemptions
//! - [`stores`]: store records

pub mod accounts;
pub mod stores;
