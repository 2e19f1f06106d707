//! Management API router: accounts, tenants, add-ons and node lists.

use crate::auth;
use crate::handlers::{self, ManagementState};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

/// Build the management router. Merge it into the main app; the bearer
/// check only applies to these routes.
pub fn management_router(state: ManagementState) -> Router {
    Router::new()
        // Auth
        .route("/accounts/login", post(handlers::handle_login))
        // Add-ons
        .route("/addons/", get(handlers::list_addons))
        .route("/addons/verify", get(handlers::verify_addons))
        // Users & groups
        .route("/user", get(handlers::list_users).post(handlers::create_user))
        .route("/user/:id", get(handlers::get_user).put(handlers::update_user).patch(handlers::update_user).delete(handlers::delete_user))
        .route("/groups", get(handlers::list_groups).post(handlers::create_group))
        .route("/groups/:id", get(handlers::get_group).put(handlers::update_group).patch(handlers::update_group).delete(handlers::delete_group))
        // Tenants
        .route("/tenants", get(handlers::list_tenants).post(handlers::create_tenant))
        .route("/tenants/:id", get(handlers::get_tenant).put(handlers::update_tenant).patch(handlers::update_tenant).delete(handlers::delete_tenant))
        .route("/tenants/:id/cloud", get(handlers::list_clouds).post(handlers::create_cloud))
        // Node lists
        .route("/logging/whitelist", get(handlers::list_whitelist).post(handlers::add_whitelisted))
        .route("/logging/whitelist/:id", get(handlers::get_whitelisted).delete(handlers::remove_whitelisted))
        .route("/logging/blacklist", get(handlers::list_blacklist).post(handlers::add_blacklisted))
        .route("/logging/blacklist/:id", get(handlers::get_blacklisted).delete(handlers::remove_blacklisted))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_token))
        .with_state(state)
}
