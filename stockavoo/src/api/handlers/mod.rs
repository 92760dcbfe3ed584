//! HTTP request handlers for the `/api` surface.
//!
//! - [`auth`]: registration, login and the email-token flows
//! - [`federated`]: Google and Facebook sign-in redirects
//! - [`users`]: account invites, profile and staff management
//! - [`stores`]: store CRUD and bulk import
//!
//! Access control happens in the extractors from [`crate::auth::permissions`] and
//! [`crate::auth::current_user`], so a handler body only runs once its gates have passed.
//! Handlers return [`crate::errors::Error`], which renders the JSON error envelope.

pub mod auth;
pub mod federated;
pub mod stores;
pub mod users;
