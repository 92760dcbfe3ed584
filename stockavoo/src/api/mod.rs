//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! Everything is mounted under `/api`:
//!
//! - **Authentication** (`/api/auth/*`): registration, login, email tokens, federated sign-in
//! - **Users** (`/api/users/*`): invites, profile and staff management
//! - **Stores** (`/api/stores/*`): store management
//!
//! OpenAPI documentation is served at `/api/docs`.

pub mod handlers;
pub mod models;
