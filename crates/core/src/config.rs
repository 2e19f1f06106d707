use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `GOLDSTONE__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub addons: AddonsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElasticsearchConfig {
    /// `host`, `host:port` or a full URL. A bare host gets port 9200.
    #[serde(default = "default_es_servers")]
    pub servers: Vec<String>,
    #[serde(default = "default_es_index")]
    pub index: String,
    #[serde(default = "default_es_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreConfig {
    /// JSON snapshot shared with the installer. In-memory only when unset.
    #[serde(default)]
    pub data_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AddonsConfig {
    /// Names of the add-on applications installed alongside the server.
    #[serde(default)]
    pub installed: Vec<String>,
}

fn default_node_id() -> String {
    "goldstone-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8000
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_es_servers() -> Vec<String> {
    vec!["localhost:9200".to_string()]
}
fn default_es_index() -> String {
    "_all".to_string()
}
fn default_es_timeout_ms() -> u64 {
    30_000
}
fn default_token_ttl_hours() -> i64 {
    24
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            servers: default_es_servers(),
            index: default_es_index(),
            request_timeout_ms: default_es_timeout_ms(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            elasticsearch: ElasticsearchConfig::default(),
            store: StoreConfig::default(),
            auth: AuthConfig::default(),
            addons: AddonsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and an optional config file.
    /// Environment values win over the file.
    pub fn load(file: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("GOLDSTONE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("elasticsearch.servers")
                    .with_list_parse_key("addons.installed"),
            )
            .build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.api.http_port, 8000);
        assert_eq!(cfg.elasticsearch.servers, vec!["localhost:9200".to_string()]);
        assert_eq!(cfg.elasticsearch.index, "_all");
        assert!(cfg.store.data_file.is_none());
        assert!(cfg.addons.installed.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("goldstone.toml");
        std::fs::write(
            &path,
            "[api]\nhttp_port = 9100\n\n[addons]\ninstalled = [\"leases\"]\n",
        )
        .unwrap();

        let cfg = AppConfig::load(path.to_str()).unwrap();
        assert_eq!(cfg.api.http_port, 9100);
        assert_eq!(cfg.addons.installed, vec!["leases".to_string()]);
        assert_eq!(cfg.auth.token_ttl_hours, 24);
    }
}
