//! Management domain types: add-ons, tenants, clouds, users, groups, nodes.
//!
//! Stored types carry secrets (password hashes, cloud passwords) and are what
//! the snapshot file holds; the `*View` types are what the API returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Add-ons ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Addon {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub manufacturer: String,
    pub url_root: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub installed_date: DateTime<Utc>,
    #[serde(default)]
    pub updated_date: Option<DateTime<Utc>>,
}

/// An add-on row as listed by the API: no primary key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddonView {
    pub name: String,
    pub version: String,
    pub manufacturer: String,
    pub url_root: String,
    pub notes: Option<String>,
    pub installed_date: DateTime<Utc>,
    pub updated_date: Option<DateTime<Utc>>,
}

impl From<&Addon> for AddonView {
    fn from(a: &Addon) -> Self {
        Self {
            name: a.name.clone(),
            version: a.version.clone(),
            manufacturer: a.manufacturer.clone(),
            url_root: a.url_root.clone(),
            notes: a.notes.clone(),
            installed_date: a.installed_date,
            updated_date: a.updated_date,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallAddonRequest {
    pub name: String,
    pub version: String,
    pub manufacturer: String,
    pub url_root: String,
    #[serde(default)]
    pub notes: Option<String>,
}

// ─── Tenants & clouds ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tenant {
    pub uuid: Uuid,
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub owner_contact: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub owner_contact: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTenantRequest {
    pub name: Option<String>,
    pub owner: Option<String>,
    pub owner_contact: Option<String>,
}

/// OpenStack credentials a tenant monitors. Unique on
/// `(tenant, tenant_name, username)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cloud {
    pub uuid: Uuid,
    pub tenant: Uuid,
    pub tenant_name: String,
    pub username: String,
    pub password: String,
    pub auth_url: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloudView {
    pub uuid: Uuid,
    pub tenant: Uuid,
    pub tenant_name: String,
    pub username: String,
    pub auth_url: String,
    pub created: DateTime<Utc>,
}

impl From<&Cloud> for CloudView {
    fn from(c: &Cloud) -> Self {
        Self {
            uuid: c.uuid,
            tenant: c.tenant,
            tenant_name: c.tenant_name.clone(),
            username: c.username.clone(),
            auth_url: c.auth_url.clone(),
            created: c.created,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCloudRequest {
    pub tenant_name: String,
    pub username: String,
    pub password: String,
    pub auth_url: String,
}

// ─── Users & groups ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub uuid: Uuid,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub password_hash: String,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub tenant: Option<Uuid>,
    #[serde(default)]
    pub tenant_admin: bool,
    #[serde(default)]
    pub default_tenant_admin: bool,
    pub date_joined: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserView {
    pub uuid: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub is_active: bool,
    pub tenant: Option<Uuid>,
    pub tenant_admin: bool,
    pub default_tenant_admin: bool,
    pub date_joined: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        Self {
            uuid: u.uuid,
            username: u.username.clone(),
            email: u.email.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            is_superuser: u.is_superuser,
            is_staff: u.is_staff,
            is_active: u.is_active,
            tenant: u.tenant,
            tenant_admin: u.tenant_admin,
            default_tenant_admin: u.default_tenant_admin,
            date_joined: u.date_joined,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_superuser: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
    pub tenant: Option<Uuid>,
    pub tenant_admin: Option<bool>,
    pub default_tenant_admin: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupRequest {
    pub name: String,
}

// ─── Node lists ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeList {
    Whitelist,
    Blacklist,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeEntry {
    pub id: Uuid,
    pub name: String,
    pub list: NodeList,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeRequest {
    pub name: String,
}

// ─── Auth ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
