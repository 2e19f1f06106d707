//! Axum REST handlers for the management API.

use crate::addons;
use crate::auth::{self, TokenRegistry};
use crate::error::ApiError;
use crate::models::*;
use crate::store::ManagementStore;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Shared management state.
#[derive(Clone)]
pub struct ManagementState {
    pub store: Arc<ManagementStore>,
    pub tokens: Arc<TokenRegistry>,
    /// Apps an add-on's `url_root` may point at.
    pub installed_apps: Arc<Vec<String>>,
    /// Snapshot written after every change, when set.
    pub data_file: Option<PathBuf>,
}

impl ManagementState {
    pub fn new(store: Arc<ManagementStore>, token_ttl_hours: i64) -> Self {
        Self {
            store,
            tokens: Arc::new(TokenRegistry::new(token_ttl_hours)),
            installed_apps: Arc::new(Vec::new()),
            data_file: None,
        }
    }

    pub fn with_installed_apps(mut self, apps: Vec<String>) -> Self {
        self.installed_apps = Arc::new(apps);
        self
    }

    pub fn with_data_file(mut self, path: Option<PathBuf>) -> Self {
        self.data_file = path;
        self
    }

    fn persist(&self) -> Result<(), ApiError> {
        if let Some(path) = &self.data_file {
            if let Err(e) = self.store.save(path) {
                error!(error = %e, path = %path.display(), "Failed to write management snapshot");
                return Err(e.into());
            }
        }
        Ok(())
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn missing(what: &str, id: Uuid) -> ApiError {
    ApiError::NotFound(format!("{what} {id} not found"))
}

fn deleted(state: &ManagementState, found: bool, what: &str, id: Uuid) -> ApiResult<StatusCode> {
    if !found {
        return Err(missing(what, id));
    }
    state.persist()?;
    metrics::counter!("management.deletes", "entity" => what.to_string()).increment(1);
    Ok(StatusCode::NO_CONTENT)
}

fn created<T: serde::Serialize>(body: T) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

// ─── Auth ──────────────────────────────────────────────────────────────────

pub async fn handle_login(
    State(state): State<ManagementState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    match auth::authenticate(&state.store, &req) {
        Some(user) => {
            metrics::counter!("management.logins").increment(1);
            info!(username = %user.username, "Login");
            Ok(Json(state.tokens.issue(&user)))
        }
        None => {
            metrics::counter!("management.login_failures").increment(1);
            Err(ApiError::Unauthorized("Invalid credentials".into()))
        }
    }
}

// ─── Add-ons ───────────────────────────────────────────────────────────────

pub async fn list_addons(State(state): State<ManagementState>) -> Json<Vec<AddonView>> {
    Json(addons::list_views(&state.store))
}

/// 200 with `[]` when every row points at an installed app, else 400 with the
/// offending add-on names.
pub async fn verify_addons(State(state): State<ManagementState>) -> Response {
    let (valid, bad) = addons::verify_store(&state.store, &state.installed_apps);
    if valid {
        Json(Vec::<String>::new()).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(bad)).into_response()
    }
}

// ─── Users ─────────────────────────────────────────────────────────────────

pub async fn list_users(State(state): State<ManagementState>) -> Json<Vec<UserView>> {
    Json(state.store.list_users().iter().map(UserView::from).collect())
}

pub async fn get_user(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserView>> {
    state
        .store
        .get_user(id)
        .map(|u| Json(UserView::from(&u)))
        .ok_or_else(|| missing("user", id))
}

pub async fn create_user(
    State(state): State<ManagementState>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<Response> {
    let user = state.store.create_user(req)?;
    state.persist()?;
    metrics::counter!("management.users.created").increment(1);
    Ok(created(UserView::from(&user)))
}

pub async fn update_user(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserView>> {
    let user = state.store.update_user(id, req)?;
    state.persist()?;
    Ok(Json(UserView::from(&user)))
}

pub async fn delete_user(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let found = state.store.delete_user(id);
    deleted(&state, found, "user", id)
}

// ─── Groups ────────────────────────────────────────────────────────────────

pub async fn list_groups(State(state): State<ManagementState>) -> Json<Vec<Group>> {
    Json(state.store.list_groups())
}

pub async fn get_group(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Group>> {
    state.store.get_group(id).map(Json).ok_or_else(|| missing("group", id))
}

pub async fn create_group(
    State(state): State<ManagementState>,
    Json(req): Json<GroupRequest>,
) -> ApiResult<Response> {
    let group = state.store.create_group(req.name)?;
    state.persist()?;
    Ok(created(group))
}

pub async fn update_group(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
    Json(req): Json<GroupRequest>,
) -> ApiResult<Json<Group>> {
    let group = state.store.rename_group(id, req.name)?;
    state.persist()?;
    Ok(Json(group))
}

pub async fn delete_group(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let found = state.store.delete_group(id);
    deleted(&state, found, "group", id)
}

// ─── Tenants & clouds ──────────────────────────────────────────────────────

pub async fn list_tenants(State(state): State<ManagementState>) -> Json<Vec<Tenant>> {
    Json(state.store.list_tenants())
}

pub async fn get_tenant(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Tenant>> {
    state.store.get_tenant(id).map(Json).ok_or_else(|| missing("tenant", id))
}

pub async fn create_tenant(
    State(state): State<ManagementState>,
    Json(req): Json<CreateTenantRequest>,
) -> ApiResult<Response> {
    let tenant = state.store.create_tenant(req)?;
    state.persist()?;
    metrics::counter!("management.tenants.created").increment(1);
    Ok(created(tenant))
}

pub async fn update_tenant(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTenantRequest>,
) -> ApiResult<Json<Tenant>> {
    let tenant = state.store.update_tenant(id, req)?;
    state.persist()?;
    Ok(Json(tenant))
}

pub async fn delete_tenant(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let found = state.store.delete_tenant(id);
    deleted(&state, found, "tenant", id)
}

pub async fn list_clouds(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<CloudView>>> {
    if state.store.get_tenant(id).is_none() {
        return Err(missing("tenant", id));
    }
    Ok(Json(state.store.list_clouds(id).iter().map(CloudView::from).collect()))
}

pub async fn create_cloud(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateCloudRequest>,
) -> ApiResult<Response> {
    let cloud = state.store.create_cloud(id, req)?;
    state.persist()?;
    Ok(created(CloudView::from(&cloud)))
}

// ─── Node white/black lists ────────────────────────────────────────────────

async fn list_nodes(state: &ManagementState, list: NodeList) -> Json<Vec<NodeEntry>> {
    Json(state.store.list_nodes(list))
}

async fn get_node(state: &ManagementState, list: NodeList, id: Uuid) -> ApiResult<Json<NodeEntry>> {
    state
        .store
        .get_node(list, id)
        .map(Json)
        .ok_or_else(|| missing("node", id))
}

async fn add_node(state: &ManagementState, list: NodeList, req: NodeRequest) -> ApiResult<Response> {
    let node = state.store.add_node(list, req.name)?;
    state.persist()?;
    Ok(created(node))
}

async fn remove_node(state: &ManagementState, list: NodeList, id: Uuid) -> ApiResult<StatusCode> {
    let found = state.store.remove_node(list, id);
    deleted(state, found, "node", id)
}

pub async fn list_whitelist(State(state): State<ManagementState>) -> Json<Vec<NodeEntry>> {
    list_nodes(&state, NodeList::Whitelist).await
}

pub async fn get_whitelisted(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<NodeEntry>> {
    get_node(&state, NodeList::Whitelist, id).await
}

pub async fn add_whitelisted(
    State(state): State<ManagementState>,
    Json(req): Json<NodeRequest>,
) -> ApiResult<Response> {
    add_node(&state, NodeList::Whitelist, req).await
}

pub async fn remove_whitelisted(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    remove_node(&state, NodeList::Whitelist, id).await
}

pub async fn list_blacklist(State(state): State<ManagementState>) -> Json<Vec<NodeEntry>> {
    list_nodes(&state, NodeList::Blacklist).await
}

pub async fn get_blacklisted(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<NodeEntry>> {
    get_node(&state, NodeList::Blacklist, id).await
}

pub async fn add_blacklisted(
    State(state): State<ManagementState>,
    Json(req): Json<NodeRequest>,
) -> ApiResult<Response> {
    add_node(&state, NodeList::Blacklist, req).await
}

pub async fn remove_blacklisted(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    remove_node(&state, NodeList::Blacklist, id).await
}
