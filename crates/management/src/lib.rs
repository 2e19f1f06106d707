//! Goldstone account management: users, groups, tenants and their OpenStack
//! cloud credentials, installed add-ons, and the node white/black lists.
//!
//! Data lives in DashMap and can be snapshotted to a JSON file so the
//! installer and the server see the same accounts.

pub mod addons;
pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod store;

pub use auth::TokenRegistry;
pub use error::ApiError;
pub use handlers::ManagementState;
pub use router::management_router;
pub use store::ManagementStore;
