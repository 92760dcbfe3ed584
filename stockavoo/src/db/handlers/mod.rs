//! Repository implementations.
//!
//! [`repository`] defines the storage traits; [`Users`] and [`Stores`] implement them over a
//! Postgres pool.

pub mod repository;
pub mod stores;
pub mod users;

pub use repository::{AccountRepository, StoreRepository};
pub use stores::Stores;
pub use users::Users;
