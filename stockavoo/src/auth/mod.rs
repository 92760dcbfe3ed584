//! Authentication and authorization.
//!
//! # Authentication
//!
//! Every authenticated request carries `Authorization: Bearer <token>`, where the token is a
//! signed session JWT naming the account. Tokens are issued by registration, login, password
//! reset, invited-account setup and federated sign-in. The gatekeeper in [`current_user`]
//! reloads the account on every request, so a deactivated account is locked out at once.
//!
//! Email verification, password reset and password setup use separate single-use tokens
//! ([`tokens`]): random, mailed once, stored only as a SHA-256 digest and consumed atomically.
//!
//! # Authorization
//!
//! - **Roles**: a closed set (owner, manager, clerk, accountant, warehouse manager)
//! - **Permissions**: a static role to resource to actions matrix
//! - **Ownership**: owners act on any account, everyone else only on their own
//!
//! See [`permissions`] for the matrix and the extractor gates.
//!
//! # Modules
//!
//! - [`current_user`]: the gatekeeper extractor and the email-verified variant
//! - [`federated`]: Google and Facebook sign-in
//! - [`lifecycle`]: registration, login and the email-token flows
//! - [`password`]: Argon2 hashing and token digests
//! - [`permissions`]: the permission matrix and access gates
//! - [`session`]: session token issuing and verification
//! - [`tokens`]: single-use email tokens
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use stockavoo::auth::permissions::{RequiresRole, roles};
//!
//! async fn owner_only(owner: RequiresRole<roles::OwnerOnly>) -> String {
//!     format!("Hello, {}!", owner.full_name)
//! }
//! ```

pub mod current_user;
pub mod federated;
pub mod lifecycle;
pub mod password;
pub mod permissions;
pub mod session;
pub mod tokens;
