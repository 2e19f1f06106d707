//! What Goldstone changes on an OpenStack host, service by service.

use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigEdit {
    pub section: String,
    pub key: String,
    pub value: String,
}

impl ConfigEdit {
    fn new(section: &str, key: &str, value: impl Into<String>) -> Self {
        Self {
            section: section.to_string(),
            key: key.to_string(),
            value: value.into(),
        }
    }
}

/// Edits grouped by the file they apply to, in application order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEdits {
    pub file: String,
    pub edits: Vec<ConfigEdit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateUpload {
    /// Destination on the host.
    pub file: String,
    /// Name under the service's template directory.
    pub template: String,
    pub context: HashMap<String, String>,
}

impl TemplateUpload {
    fn plain(file: &str, template: &str) -> Self {
        Self {
            file: file.to_string(),
            template: template.to_string(),
            context: HashMap::new(),
        }
    }

    fn with_addr(file: &str, template: &str, goldstone_addr: &str) -> Self {
        let mut upload = Self::plain(file, template);
        upload
            .context
            .insert("goldstone_addr".to_string(), goldstone_addr.to_string());
        upload
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceProfile {
    pub name: String,
    /// Subdirectory of the template root holding this service's templates.
    pub template_subdir: String,
    pub single_value_edits: Vec<FileEdits>,
    pub multi_value_edits: Vec<FileEdits>,
    pub templates: Vec<TemplateUpload>,
    pub restart_command: String,
}

/// `syslog_log_facility`, `use_syslog` and `verbose` in `[DEFAULT]`.
fn syslog_edits(facility: &str) -> Vec<ConfigEdit> {
    vec![
        ConfigEdit::new("DEFAULT", "syslog_log_facility", facility),
        ConfigEdit::new("DEFAULT", "use_syslog", "True"),
        ConfigEdit::new("DEFAULT", "verbose", "True"),
    ]
}

fn notification_driver(file: &str, driver: &str) -> FileEdits {
    FileEdits {
        file: file.to_string(),
        edits: vec![ConfigEdit::new("DEFAULT", "notification_driver", driver)],
    }
}

pub fn nova() -> ServiceProfile {
    let conf = "/etc/nova/nova.conf";
    let mut edits = syslog_edits("LOG_LOCAL0");
    edits.extend([
        ConfigEdit::new("DEFAULT", "instance_usage_audit", "True"),
        ConfigEdit::new("DEFAULT", "instance_usage_audit_period", "hour"),
        ConfigEdit::new("DEFAULT", "notify_on_state_change", "vm_and_task_state"),
    ]);

    ServiceProfile {
        name: "Nova".into(),
        template_subdir: "nova".into(),
        single_value_edits: vec![FileEdits { file: conf.into(), edits }],
        multi_value_edits: vec![notification_driver(conf, "messagingv2")],
        templates: vec![
            TemplateUpload::plain("/etc/nova/api-paste.ini", "api-paste.ini.template"),
            TemplateUpload::plain(
                "/etc/nova/nova_api_audit_map.conf",
                "nova_api_audit_map.conf.template",
            ),
        ],
        restart_command: "openstack-service restart nova".into(),
    }
}

pub fn cinder() -> ServiceProfile {
    let conf = "/etc/cinder/cinder.conf";
    let mut edits = syslog_edits("LOG_LOCAL5");
    edits.push(ConfigEdit::new("DEFAULT", "control_exchange", "cinder"));

    ServiceProfile {
        name: "Cinder".into(),
        template_subdir: "cinder".into(),
        single_value_edits: vec![FileEdits { file: conf.into(), edits }],
        multi_value_edits: vec![notification_driver(conf, "messagingv2")],
        templates: vec![
            TemplateUpload::plain("/etc/cinder/api-paste.ini", "api-paste.ini.template"),
            TemplateUpload::plain(
                "/etc/cinder/cinder_api_audit_map.conf",
                "cinder_api_audit_map.conf.template",
            ),
        ],
        restart_command: "openstack-service restart cinder".into(),
    }
}

pub fn keystone() -> ServiceProfile {
    let conf = "/etc/keystone/keystone.conf";
    let mut edits = syslog_edits("LOG_LOCAL6");
    edits.push(ConfigEdit::new("DEFAULT", "notification_format", "cadf"));

    ServiceProfile {
        name: "Keystone".into(),
        template_subdir: "keystone".into(),
        single_value_edits: vec![FileEdits { file: conf.into(), edits }],
        multi_value_edits: vec![notification_driver(conf, "messaging")],
        templates: Vec::new(),
        restart_command: "systemctl restart httpd".into(),
    }
}

pub fn neutron() -> ServiceProfile {
    ServiceProfile {
        name: "Neutron".into(),
        template_subdir: "neutron".into(),
        single_value_edits: vec![FileEdits {
            file: "/etc/neutron/neutron.conf".into(),
            edits: syslog_edits("LOG_LOCAL2"),
        }],
        multi_value_edits: Vec::new(),
        templates: vec![
            TemplateUpload::plain("/etc/neutron/api-paste.ini", "api-paste.ini.template"),
            TemplateUpload::plain(
                "/etc/neutron/neutron_api_audit_map.conf",
                "neutron_api_audit_map.conf.template",
            ),
        ],
        restart_command: "openstack-service restart neutron".into(),
    }
}

pub fn glance() -> ServiceProfile {
    let single_value_edits = [
        "/etc/glance/glance-cache.conf",
        "/etc/glance/glance-api.conf",
        "/etc/glance/glance-registry.conf",
        "/etc/glance/glance-scrubber.conf",
    ]
    .into_iter()
    .map(|file| FileEdits {
        file: file.into(),
        edits: syslog_edits("LOG_LOCAL1"),
    })
    .collect();

    ServiceProfile {
        name: "Glance".into(),
        template_subdir: "glance".into(),
        single_value_edits,
        multi_value_edits: vec![
            notification_driver("/etc/glance/glance-api.conf", "messagingv2"),
            notification_driver("/etc/glance/glance-registry.conf", "messagingv2"),
        ],
        templates: vec![
            TemplateUpload::plain(
                "/etc/glance/glance-api-paste.ini",
                "glance-api-paste.ini.template",
            ),
            TemplateUpload::plain(
                "/etc/glance/glance_api_audit_map.conf",
                "glance_api_audit_map.conf.template",
            ),
        ],
        restart_command: "openstack-service restart glance".into(),
    }
}

pub fn ceilometer(goldstone_addr: &str) -> ServiceProfile {
    let mut edits = syslog_edits("LOG_LOCAL3");
    edits.extend([
        ConfigEdit::new("event", "definitions_cfg_file", "event_definitions.yaml"),
        ConfigEdit::new("event", "drop_unmatched_notifications", "False"),
        ConfigEdit::new("notification", "store_events", "True"),
        ConfigEdit::new("notification", "disable_non_metric_meters", "True"),
        ConfigEdit::new(
            "database",
            "event_connection",
            format!("es://{goldstone_addr}:9200"),
        ),
    ]);

    ServiceProfile {
        name: "Ceilometer".into(),
        template_subdir: "ceilometer".into(),
        single_value_edits: vec![FileEdits {
            file: "/etc/ceilometer/ceilometer.conf".into(),
            edits,
        }],
        multi_value_edits: Vec::new(),
        templates: vec![
            TemplateUpload::with_addr(
                "/etc/ceilometer/pipeline.yaml",
                "pipeline.yaml.template",
                goldstone_addr,
            ),
            TemplateUpload::plain(
                "/etc/ceilometer/event_pipeline.yaml",
                "event_pipeline.yaml.template",
            ),
            TemplateUpload::plain(
                "/etc/ceilometer/event_definitions.yaml",
                "event_definitions.yaml.template",
            ),
            TemplateUpload::plain("/etc/ceilometer/api_paste.ini", "api_paste.ini.template"),
        ],
        restart_command: "openstack-service restart ceilometer".into(),
    }
}

pub fn rsyslog(goldstone_addr: &str) -> ServiceProfile {
    ServiceProfile {
        name: "Rsyslog".into(),
        template_subdir: "rsyslog".into(),
        single_value_edits: Vec::new(),
        multi_value_edits: Vec::new(),
        templates: vec![
            TemplateUpload::plain("/etc/rsyslog.conf", "rsyslog.conf.template"),
            TemplateUpload::with_addr(
                "/etc/rsyslog.d/10-goldstone.conf",
                "10-goldstone.conf.template",
                goldstone_addr,
            ),
        ],
        restart_command: "service rsyslog restart".into(),
    }
}

/// Every profile, in the order a stack is configured.
pub fn stack_profiles(goldstone_addr: &str) -> Vec<ServiceProfile> {
    vec![
        rsyslog(goldstone_addr),
        ceilometer(goldstone_addr),
        nova(),
        neutron(),
        cinder(),
        glance(),
        keystone(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_order() {
        let names: Vec<String> = stack_profiles("10.0.0.5")
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(
            names,
            vec!["Rsyslog", "Ceilometer", "Nova", "Neutron", "Cinder", "Glance", "Keystone"]
        );
    }

    #[test]
    fn test_ceilometer_points_at_goldstone() {
        let profile = ceilometer("10.0.0.5");
        let edits = &profile.single_value_edits[0].edits;
        let conn = edits.iter().find(|e| e.key == "event_connection").unwrap();
        assert_eq!(conn.section, "database");
        assert_eq!(conn.value, "es://10.0.0.5:9200");
        assert_eq!(profile.templates[0].context["goldstone_addr"], "10.0.0.5");
        assert!(profile.templates[1].context.is_empty());
    }

    #[test]
    fn test_glance_touches_four_files() {
        let profile = glance();
        assert_eq!(profile.single_value_edits.len(), 4);
        assert!(profile
            .single_value_edits
            .iter()
            .all(|f| f.edits[0].value == "LOG_LOCAL1"));
        assert_eq!(profile.multi_value_edits.len(), 2);
    }

    #[test]
    fn test_keystone_uses_cadf() {
        let profile = keystone();
        assert!(profile.templates.is_empty());
        assert_eq!(profile.multi_value_edits[0].edits[0].value, "messaging");
        assert_eq!(profile.restart_command, "systemctl restart httpd");
    }

    #[test]
    fn test_every_template_is_shipped() {
        let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("templates");
        for profile in stack_profiles("10.0.0.5") {
            for upload in &profile.templates {
                let source = root.join(&profile.template_subdir).join(&upload.template);
                let body = std::fs::read_to_string(&source)
                    .unwrap_or_else(|e| panic!("{}: {e}", source.display()));
                if upload.context.contains_key("goldstone_addr") {
                    assert!(body.contains("{{ goldstone_addr }}"), "{}", source.display());
                }
            }
        }
    }
}
