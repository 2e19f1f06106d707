//! In-memory management store backed by DashMap, with JSON snapshot
//! persistence so the installer CLI and the server can share accounts.

use crate::auth;
use crate::models::*;
use chrono::Utc;
use dashmap::DashMap;
use goldstone_core::{GoldstoneError, GoldstoneResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

/// Everything the store holds, as written to disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub addons: Vec<Addon>,
    #[serde(default)]
    pub tenants: Vec<Tenant>,
    #[serde(default)]
    pub clouds: Vec<Cloud>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
}

/// Thread-safe store for add-ons, tenants, clouds, users, groups and node lists.
pub struct ManagementStore {
    addons: DashMap<Uuid, Addon>,
    tenants: DashMap<Uuid, Tenant>,
    clouds: DashMap<Uuid, Cloud>,
    users: DashMap<Uuid, User>,
    groups: DashMap<Uuid, Group>,
    nodes: DashMap<Uuid, NodeEntry>,
    // Serialises check-then-insert for the unique columns.
    unique_guard: Mutex<()>,
    // Snapshot as last read from or written to disk; base of the save merge.
    synced: Mutex<StoreSnapshot>,
}

impl Default for ManagementStore {
    fn default() -> Self {
        Self::new()
    }
}

fn conflict(what: &str, value: &str) -> GoldstoneError {
    GoldstoneError::Conflict(format!("{what} '{value}' already exists"))
}

fn not_found(what: &str, id: Uuid) -> GoldstoneError {
    GoldstoneError::NotFound(format!("{what} {id}"))
}

/// Three-way merge of one entity table. Returns how many rows changed.
fn merge_rows<T: Clone + PartialEq>(
    ours: &DashMap<Uuid, T>,
    base: &[T],
    theirs: Vec<T>,
    id: impl Fn(&T) -> Uuid,
) -> usize {
    let base: HashMap<Uuid, &T> = base.iter().map(|row| (id(row), row)).collect();
    let mut theirs: HashMap<Uuid, T> = theirs.into_iter().map(|row| (id(&row), row)).collect();
    let mut changed = 0;

    for (key, old) in &base {
        let ours_untouched = ours.get(key).is_some_and(|row| row.value() == *old);
        match theirs.remove(key) {
            Some(row) if row != **old && ours_untouched => {
                ours.insert(*key, row);
                changed += 1;
            }
            None if ours_untouched => {
                ours.remove(key);
                changed += 1;
            }
            _ => {}
        }
    }
    // Whatever is left was created elsewhere.
    for (key, row) in theirs {
        if !ours.contains_key(&key) {
            ours.insert(key, row);
            changed += 1;
        }
    }
    changed
}

impl ManagementStore {
    pub fn new() -> Self {
        Self {
            addons: DashMap::new(),
            tenants: DashMap::new(),
            clouds: DashMap::new(),
            users: DashMap::new(),
            groups: DashMap::new(),
            nodes: DashMap::new(),
            unique_guard: Mutex::new(()),
            synced: Mutex::new(StoreSnapshot::default()),
        }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.unique_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ─── Persistence ───────────────────────────────────────────────────────

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        *store.synced_base() = snapshot.clone();
        for a in snapshot.addons {
            store.addons.insert(a.id, a);
        }
        for t in snapshot.tenants {
            store.tenants.insert(t.uuid, t);
        }
        for c in snapshot.clouds {
            store.clouds.insert(c.uuid, c);
        }
        for u in snapshot.users {
            store.users.insert(u.uuid, u);
        }
        for g in snapshot.groups {
            store.groups.insert(g.id, g);
        }
        for n in snapshot.nodes {
            store.nodes.insert(n.id, n);
        }
        store
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        fn sorted<T: Clone, K: Ord>(map: &DashMap<Uuid, T>, key: impl Fn(&T) -> K) -> Vec<T> {
            let mut items: Vec<T> = map.iter().map(|r| r.value().clone()).collect();
            items.sort_by_key(|item| key(item));
            items
        }

        StoreSnapshot {
            addons: sorted(&self.addons, |a| a.name.clone()),
            tenants: sorted(&self.tenants, |t| t.created),
            clouds: sorted(&self.clouds, |c| c.created),
            users: sorted(&self.users, |u| u.date_joined),
            groups: sorted(&self.groups, |g| g.name.clone()),
            nodes: sorted(&self.nodes, |n| n.created),
        }
    }

    /// Load a snapshot file. A missing file yields an empty store.
    pub fn load(path: &Path) -> GoldstoneResult<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No snapshot file, starting with an empty store");
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            tenants = snapshot.tenants.len(),
            users = snapshot.users.len(),
            "Management store loaded"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    fn synced_base(&self) -> std::sync::MutexGuard<'_, StoreSnapshot> {
        self.synced
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fold changes another process wrote to `path` since this store last
    /// synced with it into memory.
    ///
    /// Per entity, a row changed on disk and untouched here is taken from
    /// disk; a row deleted on disk and untouched here is deleted; rows only
    /// on disk are adopted unless this store deleted them. Local changes win
    /// otherwise.
    fn merge_from_disk(&self, theirs: StoreSnapshot, base: &StoreSnapshot) -> usize {
        let _guard = self.guard();
        merge_rows(&self.addons, &base.addons, theirs.addons, |a| a.id)
            + merge_rows(&self.tenants, &base.tenants, theirs.tenants, |t| t.uuid)
            + merge_rows(&self.clouds, &base.clouds, theirs.clouds, |c| c.uuid)
            + merge_rows(&self.users, &base.users, theirs.users, |u| u.uuid)
            + merge_rows(&self.groups, &base.groups, theirs.groups, |g| g.id)
            + merge_rows(&self.nodes, &base.nodes, theirs.nodes, |n| n.id)
    }

    /// Merge what is on disk, then atomically replace `path` with the result.
    ///
    /// Saves are serialised; each one writes a fresh temp file in the target
    /// directory and persists it over `path`.
    pub fn save(&self, path: &Path) -> GoldstoneResult<()> {
        let mut base = self.synced_base();

        if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let theirs: StoreSnapshot = serde_json::from_str(&raw)?;
            let merged = self.merge_from_disk(theirs, &base);
            if merged > 0 {
                info!(path = %path.display(), rows = merged, "Merged external snapshot changes");
            }
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let snapshot = self.snapshot();
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(&snapshot)?)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| GoldstoneError::Io(e.error))?;

        *base = snapshot;
        debug!(path = %path.display(), "Management store saved");
        Ok(())
    }

    // ─── Add-ons ───────────────────────────────────────────────────────────

    pub fn list_addons(&self) -> Vec<Addon> {
        let mut addons: Vec<Addon> = self.addons.iter().map(|r| r.value().clone()).collect();
        addons.sort_by(|a, b| a.name.cmp(&b.name));
        addons
    }

    /// Register an add-on. Re-installing an existing name updates its row.
    pub fn install_addon(&self, req: InstallAddonRequest) -> Addon {
        let _guard = self.guard();
        let now = Utc::now();

        if let Some(mut existing) = self.addons.iter_mut().find(|r| r.value().name == req.name) {
            let a = existing.value_mut();
            a.version = req.version;
            a.manufacturer = req.manufacturer;
            a.url_root = req.url_root;
            a.notes = req.notes;
            a.updated_date = Some(now);
            info!(addon = %a.name, version = %a.version, "Add-on updated");
            return a.clone();
        }

        let addon = Addon {
            id: Uuid::new_v4(),
            name: req.name,
            version: req.version,
            manufacturer: req.manufacturer,
            url_root: req.url_root,
            notes: req.notes,
            installed_date: now,
            updated_date: None,
        };
        info!(addon = %addon.name, version = %addon.version, "Add-on installed");
        self.addons.insert(addon.id, addon.clone());
        addon
    }

    pub fn remove_addon(&self, name: &str) -> bool {
        let id = self
            .addons
            .iter()
            .find(|r| r.value().name == name)
            .map(|r| *r.key());
        match id {
            Some(id) => self.addons.remove(&id).is_some(),
            None => false,
        }
    }

    // ─── Tenants ───────────────────────────────────────────────────────────

    pub fn list_tenants(&self) -> Vec<Tenant> {
        let mut tenants: Vec<Tenant> = self.tenants.iter().map(|r| r.value().clone()).collect();
        tenants.sort_by(|a, b| a.name.cmp(&b.name));
        tenants
    }

    pub fn get_tenant(&self, id: Uuid) -> Option<Tenant> {
        self.tenants.get(&id).map(|r| r.value().clone())
    }

    pub fn find_tenant_by_name(&self, name: &str) -> Option<Tenant> {
        self.tenants
            .iter()
            .find(|r| r.value().name == name)
            .map(|r| r.value().clone())
    }

    pub fn create_tenant(&self, req: CreateTenantRequest) -> GoldstoneResult<Tenant> {
        let _guard = self.guard();
        if self.tenants.iter().any(|r| r.value().name == req.name) {
            return Err(conflict("tenant", &req.name));
        }

        let now = Utc::now();
        let tenant = Tenant {
            uuid: Uuid::new_v4(),
            name: req.name,
            owner: req.owner,
            owner_contact: req.owner_contact,
            created: now,
            updated: now,
        };
        info!(tenant_id = %tenant.uuid, tenant_name = %tenant.name, "Tenant created");
        self.tenants.insert(tenant.uuid, tenant.clone());
        Ok(tenant)
    }

    pub fn update_tenant(&self, id: Uuid, req: UpdateTenantRequest) -> GoldstoneResult<Tenant> {
        let _guard = self.guard();
        if let Some(name) = &req.name {
            if self
                .tenants
                .iter()
                .any(|r| r.value().name == *name && *r.key() != id)
            {
                return Err(conflict("tenant", name));
            }
        }

        let mut entry = self.tenants.get_mut(&id).ok_or_else(|| not_found("tenant", id))?;
        let t = entry.value_mut();
        if let Some(name) = req.name {
            t.name = name;
        }
        if let Some(owner) = req.owner {
            t.owner = owner;
        }
        if let Some(contact) = req.owner_contact {
            t.owner_contact = contact;
        }
        t.updated = Utc::now();
        Ok(t.clone())
    }

    /// Delete a tenant with its clouds; member users are detached.
    pub fn delete_tenant(&self, id: Uuid) -> bool {
        let _guard = self.guard();
        if self.tenants.remove(&id).is_none() {
            return false;
        }
        self.clouds.retain(|_, c| c.tenant != id);
        for mut user in self.users.iter_mut() {
            if user.tenant == Some(id) {
                user.tenant = None;
                user.tenant_admin = false;
                user.default_tenant_admin = false;
            }
        }
        info!(tenant_id = %id, "Tenant deleted");
        true
    }

    // ─── Clouds ────────────────────────────────────────────────────────────

    pub fn list_clouds(&self, tenant: Uuid) -> Vec<Cloud> {
        let mut clouds: Vec<Cloud> = self
            .clouds
            .iter()
            .filter(|r| r.value().tenant == tenant)
            .map(|r| r.value().clone())
            .collect();
        clouds.sort_by(|a, b| a.created.cmp(&b.created));
        clouds
    }

    pub fn find_cloud(&self, tenant: Uuid, tenant_name: &str, username: &str) -> Option<Cloud> {
        self.clouds
            .iter()
            .find(|r| {
                let c = r.value();
                c.tenant == tenant && c.tenant_name == tenant_name && c.username == username
            })
            .map(|r| r.value().clone())
    }

    pub fn create_cloud(&self, tenant: Uuid, req: CreateCloudRequest) -> GoldstoneResult<Cloud> {
        let _guard = self.guard();
        if !self.tenants.contains_key(&tenant) {
            return Err(not_found("tenant", tenant));
        }
        if self.find_cloud(tenant, &req.tenant_name, &req.username).is_some() {
            return Err(conflict(
                "cloud",
                &format!("{}/{}", req.tenant_name, req.username),
            ));
        }

        let cloud = Cloud {
            uuid: Uuid::new_v4(),
            tenant,
            tenant_name: req.tenant_name,
            username: req.username,
            password: req.password,
            auth_url: req.auth_url,
            created: Utc::now(),
        };
        info!(tenant_id = %tenant, stack_tenant = %cloud.tenant_name, "Cloud created");
        self.clouds.insert(cloud.uuid, cloud.clone());
        Ok(cloud)
    }

    // ─── Users ─────────────────────────────────────────────────────────────

    pub fn list_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|r| r.value().clone()).collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }

    pub fn get_user(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|r| r.value().clone())
    }

    pub fn find_user_by_username(&self, username: &str) -> Option<User> {
        self.users
            .iter()
            .find(|r| r.value().username == username)
            .map(|r| r.value().clone())
    }

    pub fn create_user(&self, req: CreateUserRequest) -> GoldstoneResult<User> {
        if req.username.trim().is_empty() {
            return Err(GoldstoneError::Validation(vec!["username may not be blank".into()]));
        }
        if req.password.is_empty() {
            return Err(GoldstoneError::Validation(vec!["password may not be blank".into()]));
        }

        let _guard = self.guard();
        if self.users.iter().any(|r| r.value().username == req.username) {
            return Err(conflict("user", &req.username));
        }

        let user = User {
            uuid: Uuid::new_v4(),
            username: req.username,
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            password_hash: auth::hash_password(&req.password),
            is_superuser: req.is_superuser,
            is_staff: req.is_superuser,
            is_active: true,
            tenant: None,
            tenant_admin: false,
            default_tenant_admin: false,
            date_joined: Utc::now(),
        };
        info!(username = %user.username, superuser = user.is_superuser, "User created");
        self.users.insert(user.uuid, user.clone());
        Ok(user)
    }

    pub fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> GoldstoneResult<User> {
        let _guard = self.guard();
        if let Some(username) = &req.username {
            if self
                .users
                .iter()
                .any(|r| r.value().username == *username && *r.key() != id)
            {
                return Err(conflict("user", username));
            }
        }
        if let Some(tenant) = req.tenant {
            if !self.tenants.contains_key(&tenant) {
                return Err(not_found("tenant", tenant));
            }
        }

        let mut entry = self.users.get_mut(&id).ok_or_else(|| not_found("user", id))?;
        let u = entry.value_mut();
        if let Some(username) = req.username {
            u.username = username;
        }
        if let Some(password) = req.password {
            u.password_hash = auth::hash_password(&password);
        }
        if let Some(email) = req.email {
            u.email = email;
        }
        if let Some(first) = req.first_name {
            u.first_name = first;
        }
        if let Some(last) = req.last_name {
            u.last_name = last;
        }
        if let Some(active) = req.is_active {
            u.is_active = active;
        }
        if let Some(tenant) = req.tenant {
            u.tenant = Some(tenant);
        }
        if let Some(admin) = req.tenant_admin {
            u.tenant_admin = admin;
        }
        if let Some(default_admin) = req.default_tenant_admin {
            u.default_tenant_admin = default_admin;
        }
        Ok(u.clone())
    }

    pub fn delete_user(&self, id: Uuid) -> bool {
        self.users.remove(&id).is_some()
    }

    // ─── Groups ────────────────────────────────────────────────────────────

    pub fn list_groups(&self) -> Vec<Group> {
        let mut groups: Vec<Group> = self.groups.iter().map(|r| r.value().clone()).collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups
    }

    pub fn get_group(&self, id: Uuid) -> Option<Group> {
        self.groups.get(&id).map(|r| r.value().clone())
    }

    pub fn create_group(&self, name: String) -> GoldstoneResult<Group> {
        let _guard = self.guard();
        if self.groups.iter().any(|r| r.value().name == name) {
            return Err(conflict("group", &name));
        }
        let group = Group {
            id: Uuid::new_v4(),
            name,
        };
        self.groups.insert(group.id, group.clone());
        Ok(group)
    }

    pub fn rename_group(&self, id: Uuid, name: String) -> GoldstoneResult<Group> {
        let _guard = self.guard();
        if self
            .groups
            .iter()
            .any(|r| r.value().name == name && *r.key() != id)
        {
            return Err(conflict("group", &name));
        }
        let mut entry = self.groups.get_mut(&id).ok_or_else(|| not_found("group", id))?;
        entry.value_mut().name = name;
        Ok(entry.value().clone())
    }

    pub fn delete_group(&self, id: Uuid) -> bool {
        self.groups.remove(&id).is_some()
    }

    // ─── Node lists ────────────────────────────────────────────────────────

    pub fn list_nodes(&self, list: NodeList) -> Vec<NodeEntry> {
        let mut nodes: Vec<NodeEntry> = self
            .nodes
            .iter()
            .filter(|r| r.value().list == list)
            .map(|r| r.value().clone())
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    pub fn get_node(&self, list: NodeList, id: Uuid) -> Option<NodeEntry> {
        self.nodes
            .get(&id)
            .filter(|r| r.value().list == list)
            .map(|r| r.value().clone())
    }

    pub fn add_node(&self, list: NodeList, name: String) -> GoldstoneResult<NodeEntry> {
        let _guard = self.guard();
        if self
            .nodes
            .iter()
            .any(|r| r.value().list == list && r.value().name == name)
        {
            return Err(conflict("node", &name));
        }
        let node = NodeEntry {
            id: Uuid::new_v4(),
            name,
            list,
            created: Utc::now(),
        };
        self.nodes.insert(node.id, node.clone());
        Ok(node)
    }

    pub fn remove_node(&self, list: NodeList, id: Uuid) -> bool {
        self.nodes.remove_if(&id, |_, n| n.list == list).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_req(username: &str) -> CreateUserRequest {
        CreateUserRequest {
            username: username.into(),
            password: "secret".into(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            is_superuser: false,
        }
    }

    fn tenant_req(name: &str) -> CreateTenantRequest {
        CreateTenantRequest {
            name: name.into(),
            owner: "None".into(),
            owner_contact: String::new(),
        }
    }

    #[test]
    fn test_user_username_unique() {
        let store = ManagementStore::new();
        store.create_user(user_req("gsadmin")).unwrap();
        assert!(matches!(
            store.create_user(user_req("gsadmin")),
            Err(GoldstoneError::Conflict(_))
        ));
        assert_eq!(store.list_users().len(), 1);
    }

    #[test]
    fn test_blank_password_rejected() {
        let store = ManagementStore::new();
        let mut req = user_req("bob");
        req.password.clear();
        assert!(matches!(store.create_user(req), Err(GoldstoneError::Validation(_))));
    }

    #[test]
    fn test_cloud_unique_triple() {
        let store = ManagementStore::new();
        let tenant = store.create_tenant(tenant_req("default")).unwrap();
        let req = CreateCloudRequest {
            tenant_name: "admin".into(),
            username: "admin".into(),
            password: "solinea".into(),
            auth_url: "http://10.0.0.1:5000/v3/".into(),
        };
        store.create_cloud(tenant.uuid, req.clone()).unwrap();
        assert!(matches!(
            store.create_cloud(tenant.uuid, req.clone()),
            Err(GoldstoneError::Conflict(_))
        ));

        let other = store.create_tenant(tenant_req("other")).unwrap();
        store.create_cloud(other.uuid, req).unwrap();
        assert_eq!(store.list_clouds(tenant.uuid).len(), 1);
        assert_eq!(store.list_clouds(other.uuid).len(), 1);
    }

    #[test]
    fn test_delete_tenant_cascades() {
        let store = ManagementStore::new();
        let tenant = store.create_tenant(tenant_req("default")).unwrap();
        store
            .create_cloud(
                tenant.uuid,
                CreateCloudRequest {
                    tenant_name: "admin".into(),
                    username: "admin".into(),
                    password: "pw".into(),
                    auth_url: "http://x/v3/".into(),
                },
            )
            .unwrap();
        let user = store.create_user(user_req("gsadmin")).unwrap();
        store
            .update_user(
                user.uuid,
                UpdateUserRequest {
                    tenant: Some(tenant.uuid),
                    tenant_admin: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(store.delete_tenant(tenant.uuid));
        assert!(store.list_clouds(tenant.uuid).is_empty());
        let user = store.get_user(user.uuid).unwrap();
        assert_eq!(user.tenant, None);
        assert!(!user.tenant_admin);
        assert!(!store.delete_tenant(tenant.uuid));
    }

    #[test]
    fn test_node_lists_are_separate() {
        let store = ManagementStore::new();
        let w = store.add_node(NodeList::Whitelist, "compute-1".into()).unwrap();
        store.add_node(NodeList::Blacklist, "compute-1".into()).unwrap();
        assert!(store.add_node(NodeList::Whitelist, "compute-1".into()).is_err());

        assert!(store.get_node(NodeList::Blacklist, w.id).is_none());
        assert!(!store.remove_node(NodeList::Blacklist, w.id));
        assert!(store.remove_node(NodeList::Whitelist, w.id));
        assert_eq!(store.list_nodes(NodeList::Blacklist).len(), 1);
    }

    #[test]
    fn test_reinstall_addon_updates_row() {
        let store = ManagementStore::new();
        let req = InstallAddonRequest {
            name: "leases".into(),
            version: "1.0".into(),
            manufacturer: "Solinea".into(),
            url_root: "leases".into(),
            notes: None,
        };
        let first = store.install_addon(req.clone());
        let second = store.install_addon(InstallAddonRequest {
            version: "1.1".into(),
            ..req
        });
        assert_eq!(first.id, second.id);
        assert_eq!(second.version, "1.1");
        assert!(second.updated_date.is_some());
        assert_eq!(store.list_addons().len(), 1);
        assert!(store.remove_addon("leases"));
        assert!(!store.remove_addon("leases"));
    }

    #[test]
    fn test_snapshot_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("goldstone.json");

        let store = ManagementStore::new();
        let tenant = store.create_tenant(tenant_req("default")).unwrap();
        store.create_user(user_req("gsadmin")).unwrap();
        store.add_node(NodeList::Whitelist, "ctrl-01".into()).unwrap();
        store.save(&path).unwrap();

        let reloaded = ManagementStore::load(&path).unwrap();
        assert_eq!(reloaded.get_tenant(tenant.uuid).unwrap().name, "default");
        assert!(reloaded.find_user_by_username("gsadmin").is_some());
        assert_eq!(reloaded.list_nodes(NodeList::Whitelist).len(), 1);

        let empty = ManagementStore::load(&dir.path().join("missing.json")).unwrap();
        assert!(empty.list_tenants().is_empty());
    }

    #[test]
    fn test_concurrent_saves_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("goldstone.json");
        let store = ManagementStore::new();
        store.create_tenant(tenant_req("default")).unwrap();

        let failures = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        if store.save(&path).is_err() {
                            failures.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(failures.into_inner(), 0);
        let reloaded = ManagementStore::load(&path).unwrap();
        assert_eq!(reloaded.list_tenants().len(), 1);
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_save_keeps_rows_written_by_another_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("goldstone.json");

        let server = ManagementStore::new();
        server.create_user(user_req("admin")).unwrap();
        server.save(&path).unwrap();

        // Installer run while the server is up.
        let cli = ManagementStore::load(&path).unwrap();
        let tenant = cli.create_tenant(tenant_req("default")).unwrap();
        cli.save(&path).unwrap();

        server.create_user(user_req("bob")).unwrap();
        server.save(&path).unwrap();

        let on_disk = ManagementStore::load(&path).unwrap();
        assert!(on_disk.get_tenant(tenant.uuid).is_some());
        assert!(on_disk.find_user_by_username("admin").is_some());
        assert!(on_disk.find_user_by_username("bob").is_some());
        assert!(server.get_tenant(tenant.uuid).is_some());
    }

    #[test]
    fn test_save_merges_external_updates_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("goldstone.json");

        let server = ManagementStore::new();
        let renamed = server.create_tenant(tenant_req("default")).unwrap();
        let dropped = server.create_user(user_req("old")).unwrap();
        let kept = server.create_user(user_req("gsadmin")).unwrap();
        server.save(&path).unwrap();

        let cli = ManagementStore::load(&path).unwrap();
        cli.update_tenant(
            renamed.uuid,
            UpdateTenantRequest {
                owner: Some("ops".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(cli.delete_user(dropped.uuid));
        cli.save(&path).unwrap();

        // The server deletes a row the installer never touched.
        assert!(server.delete_user(kept.uuid));
        server.save(&path).unwrap();

        let on_disk = ManagementStore::load(&path).unwrap();
        assert_eq!(on_disk.get_tenant(renamed.uuid).unwrap().owner, "ops");
        assert!(on_disk.get_user(dropped.uuid).is_none());
        assert!(on_disk.get_user(kept.uuid).is_none());
        assert!(server.get_user(dropped.uuid).is_none());
    }

    #[test]
    fn test_delete_tenant_never_leaves_orphan_clouds() {
        for _ in 0..20 {
            let store = ManagementStore::new();
            let tenant = store.create_tenant(tenant_req("default")).unwrap();
            std::thread::scope(|scope| {
                scope.spawn(|| {
                    for i in 0..20 {
                        let _ = store.create_cloud(
                            tenant.uuid,
                            CreateCloudRequest {
                                tenant_name: format!("t{i}"),
                                username: "admin".into(),
                                password: "pw".into(),
                                auth_url: "http://x/v3/".into(),
                            },
                        );
                    }
                });
                scope.spawn(|| store.delete_tenant(tenant.uuid));
            });
            assert!(store.get_tenant(tenant.uuid).is_none());
            assert!(store.list_clouds(tenant.uuid).is_empty());
        }
    }
}
