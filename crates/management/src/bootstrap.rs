//! Get-or-create initialisation of the admin account, the default tenant and
//! its OpenStack cloud. Used by the installer CLI.
//!
//! Each step only asks for missing values (passwords, auth URL) when it
//! actually has to create a row.

use crate::models::*;
use crate::store::ManagementStore;
use goldstone_core::{GoldstoneError, GoldstoneResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

/// Version segment appended to every stored auth URL.
pub const AUTH_URL_VERSION: &str = "v3/";

/// Container marker checked by [`docker_install`].
pub const DOCKER_MARKER: &str = "/.dockerinit";

/// Source of values the caller did not supply.
pub trait Prompt {
    fn ask(&self, question: &str, secret: bool) -> GoldstoneResult<String>;
}

/// Non-interactive runs: every question is an error.
pub struct NoPrompt;

impl Prompt for NoPrompt {
    fn ask(&self, question: &str, _secret: bool) -> GoldstoneResult<String> {
        Err(GoldstoneError::Validation(vec![format!(
            "{question} is required"
        )]))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapOutcome<T> {
    Created(T),
    Existing(T),
}

impl<T> BootstrapOutcome<T> {
    pub fn created(&self) -> bool {
        matches!(self, BootstrapOutcome::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            BootstrapOutcome::Created(v) | BootstrapOutcome::Existing(v) => v,
        }
    }

    pub fn get(&self) -> &T {
        match self {
            BootstrapOutcome::Created(v) | BootstrapOutcome::Existing(v) => v,
        }
    }
}

fn value_or_ask(value: Option<&str>, prompt: &dyn Prompt, question: &str, secret: bool) -> GoldstoneResult<String> {
    match value {
        Some(v) => Ok(v.to_string()),
        None => prompt.ask(question, secret),
    }
}

/// Create the superuser `username` unless it already exists.
pub fn admin_init(
    store: &ManagementStore,
    username: &str,
    password: Option<&str>,
    email: &str,
    prompt: &dyn Prompt,
) -> GoldstoneResult<BootstrapOutcome<User>> {
    if let Some(existing) = store.find_user_by_username(username) {
        info!(username, "Admin account already exists, using it");
        return Ok(BootstrapOutcome::Existing(existing));
    }

    let password = value_or_ask(password, prompt, "Django admin password", true)?;
    let user = store.create_user(CreateUserRequest {
        username: username.to_string(),
        password,
        email: email.to_string(),
        first_name: String::new(),
        last_name: String::new(),
        is_superuser: true,
    })?;
    info!(username, "Admin account created");
    Ok(BootstrapOutcome::Created(user))
}

/// Get-or-create the tenant and its admin, then make the admin the tenant's
/// `tenant_admin` and `default_tenant_admin`.
pub fn tenant_init(
    store: &ManagementStore,
    tenant_name: &str,
    owner: &str,
    admin: &str,
    admin_password: Option<&str>,
    prompt: &dyn Prompt,
) -> GoldstoneResult<(BootstrapOutcome<Tenant>, BootstrapOutcome<User>)> {
    let tenant = match store.find_tenant_by_name(tenant_name) {
        Some(t) => {
            info!(tenant = tenant_name, "Tenant already exists");
            BootstrapOutcome::Existing(t)
        }
        None => BootstrapOutcome::Created(store.create_tenant(CreateTenantRequest {
            name: tenant_name.to_string(),
            owner: owner.to_string(),
            owner_contact: String::new(),
        })?),
    };

    let user = match store.find_user_by_username(admin) {
        Some(u) => {
            info!(username = admin, "Tenant admin account already exists");
            BootstrapOutcome::Existing(u)
        }
        None => {
            let password = value_or_ask(admin_password, prompt, "Goldstone admin password", true)?;
            BootstrapOutcome::Created(store.create_user(CreateUserRequest {
                username: admin.to_string(),
                password,
                email: String::new(),
                first_name: String::new(),
                last_name: String::new(),
                is_superuser: false,
            })?)
        }
    };

    let linked = store.update_user(
        user.get().uuid,
        UpdateUserRequest {
            tenant: Some(tenant.get().uuid),
            tenant_admin: Some(true),
            default_tenant_admin: Some(true),
            ..Default::default()
        },
    )?;
    info!(tenant = tenant_name, username = admin, "Tenant admin linked");

    let user = match user {
        BootstrapOutcome::Created(_) => BootstrapOutcome::Created(linked),
        BootstrapOutcome::Existing(_) => BootstrapOutcome::Existing(linked),
    };
    Ok((tenant, user))
}

fn version_segment() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/[vV]\d").expect("valid version pattern"))
}

/// Drop a trailing identity version segment and append [`AUTH_URL_VERSION`].
///
/// A segment only counts when it shows up in the last nine characters; it is
/// then cut from its first occurrence in the URL.
pub fn normalize_auth_url(url: &str) -> String {
    let tail_start = url
        .char_indices()
        .rev()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(0);

    let base = if version_segment().is_match(&url[tail_start..]) {
        match version_segment().find(url) {
            Some(m) => &url[..m.start()],
            None => url,
        }
    } else {
        url
    };

    if base.ends_with('/') {
        format!("{base}{AUTH_URL_VERSION}")
    } else {
        format!("{base}/{AUTH_URL_VERSION}")
    }
}

/// Get-or-create the cloud row keyed by `(tenant, stack_tenant, stack_user)`.
pub fn cloud_init(
    store: &ManagementStore,
    tenant: &Tenant,
    stack_tenant: &str,
    stack_user: &str,
    stack_password: Option<&str>,
    auth_url: Option<&str>,
    prompt: &dyn Prompt,
) -> GoldstoneResult<BootstrapOutcome<Cloud>> {
    if let Some(existing) = store.find_cloud(tenant.uuid, stack_tenant, stack_user) {
        info!(tenant = %tenant.name, stack_tenant, stack_user, "Cloud entry already exists");
        return Ok(BootstrapOutcome::Existing(existing));
    }

    let password = value_or_ask(stack_password, prompt, "OpenStack user password", true)?;
    let auth_url = value_or_ask(
        auth_url,
        prompt,
        "OpenStack auth URL (eg: http://10.10.10.10:5000/v2.0/)",
        false,
    )?;

    let cloud = store.create_cloud(
        tenant.uuid,
        CreateCloudRequest {
            tenant_name: stack_tenant.to_string(),
            username: stack_user.to_string(),
            password,
            auth_url: normalize_auth_url(&auth_url),
        },
    )?;
    info!(tenant = %tenant.name, auth_url = %cloud.auth_url, "Cloud entry created");
    Ok(BootstrapOutcome::Created(cloud))
}

/// Container install settings, normally taken from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct DockerInstallSettings {
    pub admin_user: String,
    pub admin_password: String,
    pub admin_email: String,
    pub tenant_admin_password: String,
    pub stack_tenant: String,
    pub stack_user: String,
    pub stack_password: String,
    pub stack_auth_url: String,
    pub settings_module: String,
    pub install_dir: PathBuf,
}

impl Default for DockerInstallSettings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl DockerInstallSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        Self {
            admin_user: get("DJANGO_ADMIN_USER", "admin"),
            admin_password: get("DJANGO_ADMIN_PASSWORD", "goldstone"),
            admin_email: get("DJANGO_ADMIN_EMAIL", "root@localhost"),
            tenant_admin_password: get("GOLDSTONE_TENANT_ADMIN_PASSWORD", "goldstone"),
            stack_tenant: get("OS_TENANT_NAME", "admin"),
            stack_user: get("OS_USERNAME", "admin"),
            stack_password: get("OS_PASSWORD", "solinea"),
            stack_auth_url: get("OS_AUTH_URL", "http://172.24.4.100:5000/v2.0/"),
            settings_module: get("DJANGO_SETTINGS_MODULE", "goldstone.settings.docker"),
            install_dir: PathBuf::from(get("GOLDSTONE_INSTALL_DIR", "/app")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DockerInstallReport {
    pub admin: BootstrapOutcome<User>,
    pub tenant: BootstrapOutcome<Tenant>,
    pub tenant_admin: BootstrapOutcome<User>,
    pub cloud: BootstrapOutcome<Cloud>,
}

/// Admin, default tenant and cloud in one go. Refuses to run outside a
/// container (no `marker` file).
pub fn docker_install(
    store: &ManagementStore,
    settings: &DockerInstallSettings,
    marker: &Path,
) -> GoldstoneResult<DockerInstallReport> {
    if !marker.is_file() {
        return Err(GoldstoneError::Config(
            "This does not appear to be a docker container".into(),
        ));
    }
    info!(
        settings_module = %settings.settings_module,
        install_dir = %settings.install_dir.display(),
        "Running container install"
    );

    let admin = admin_init(
        store,
        &settings.admin_user,
        Some(&settings.admin_password),
        &settings.admin_email,
        &NoPrompt,
    )?;
    let (tenant, tenant_admin) = tenant_init(
        store,
        "default",
        "None",
        "gsadmin",
        Some(&settings.tenant_admin_password),
        &NoPrompt,
    )?;
    let cloud = cloud_init(
        store,
        tenant.get(),
        &settings.stack_tenant,
        &settings.stack_user,
        Some(&settings.stack_password),
        Some(&settings.stack_auth_url),
        &NoPrompt,
    )?;

    Ok(DockerInstallReport {
        admin,
        tenant,
        tenant_admin,
        cloud,
    })
}
