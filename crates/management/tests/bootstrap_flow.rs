//! Installer-style bootstrap followed by a server restart reading the same
//! snapshot file.

use goldstone_management::auth;
use goldstone_management::bootstrap::{self, DockerInstallSettings, NoPrompt};
use goldstone_management::models::LoginRequest;
use goldstone_management::ManagementStore;

#[test]
fn bootstrap_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let data_file = dir.path().join("goldstone.json");
    let marker = dir.path().join(".dockerinit");
    std::fs::write(&marker, b"").unwrap();

    let store = ManagementStore::load(&data_file).unwrap();
    let settings = DockerInstallSettings::from_lookup(|key| match key {
        "DJANGO_ADMIN_PASSWORD" => Some("changeme".to_string()),
        "OS_AUTH_URL" => Some("http://192.168.1.10:5000/v2.0".to_string()),
        _ => None,
    });
    let report = bootstrap::docker_install(&store, &settings, &marker).unwrap();
    assert!(report.admin.created());
    assert!(report.cloud.created());
    store.save(&data_file).unwrap();

    // A second install against the reloaded store finds everything in place.
    let store = ManagementStore::load(&data_file).unwrap();
    let again = bootstrap::docker_install(&store, &settings, &marker).unwrap();
    assert!(!again.admin.created());
    assert!(!again.tenant.created());
    assert!(!again.tenant_admin.created());
    assert!(!again.cloud.created());

    let tenant = store.find_tenant_by_name("default").unwrap();
    let clouds = store.list_clouds(tenant.uuid);
    assert_eq!(clouds.len(), 1);
    assert_eq!(clouds[0].auth_url, "http://192.168.1.10:5000/v3/");

    let admin = auth::authenticate(
        &store,
        &LoginRequest {
            username: "admin".into(),
            password: "changeme".into(),
        },
    );
    assert!(admin.is_some_and(|u| u.is_superuser));

    let gsadmin = store.find_user_by_username("gsadmin").unwrap();
    assert_eq!(gsadmin.tenant, Some(tenant.uuid));
    assert!(gsadmin.default_tenant_admin);
}

#[test]
fn cloud_init_without_answers_fails_cleanly() {
    let store = ManagementStore::new();
    let (tenant, _) =
        bootstrap::tenant_init(&store, "default", "None", "gsadmin", Some("pw"), &NoPrompt).unwrap();
    let result = bootstrap::cloud_init(&store, tenant.get(), "admin", "admin", None, None, &NoPrompt);
    assert!(result.is_err());
    assert!(store.list_clouds(tenant.get().uuid).is_empty());
}
