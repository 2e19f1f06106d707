//! Add-on table verification.

use crate::models::{Addon, AddonView};
use crate::store::ManagementStore;
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

fn url_root_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([a-z0-9_-]+)/?$").expect("valid url_root pattern"))
}

/// The app an add-on's `url_root` points at, if it is a well-formed slug.
pub fn app_name(url_root: &str) -> Option<&str> {
    url_root_pattern()
        .captures(url_root)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Split add-on rows into valid and bad. A row is bad when its `url_root` is
/// not a slug naming one of `installed_apps`. Returns `(valid, bad_names)`.
pub fn check_table(addons: &[Addon], installed_apps: &[String]) -> (bool, Vec<String>) {
    let bad: Vec<String> = addons
        .iter()
        .filter(|a| match app_name(&a.url_root) {
            Some(app) => !installed_apps.iter().any(|i| i == app),
            None => true,
        })
        .map(|a| a.name.clone())
        .collect();

    if !bad.is_empty() {
        warn!(bad = ?bad, "Add-on table has rows without an installed app");
    }
    (bad.is_empty(), bad)
}

pub fn verify_store(store: &ManagementStore, installed_apps: &[String]) -> (bool, Vec<String>) {
    check_table(&store.list_addons(), installed_apps)
}

pub fn list_views(store: &ManagementStore) -> Vec<AddonView> {
    store.list_addons().iter().map(AddonView::from).collect()
}
