//! Applying service profiles to a host.

use crate::backup::BackupLedger;
use crate::error::{InstallerError, InstallerResult};
use crate::ini::{self, EditOutcome};
use crate::profiles::{self, FileEdits, ServiceProfile, TemplateUpload};
use crate::shell::RemoteShell;
use chrono::Utc;
use goldstone_core::templates::TemplateRenderer;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditRecord {
    pub file: String,
    pub section: String,
    pub key: String,
    pub outcome: EditOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
    pub service: String,
    pub backups: Vec<String>,
    pub edits: Vec<EditRecord>,
    pub uploads: Vec<String>,
    /// Config files or templates that were missing.
    pub skipped: Vec<String>,
    pub restarted: bool,
}

#[derive(Clone, Copy)]
enum EditKind {
    Single,
    Multi,
}

async fn apply_file_edits(
    shell: &dyn RemoteShell,
    ledger: &mut BackupLedger,
    file_edits: &FileEdits,
    kind: EditKind,
    report: &mut ServiceReport,
) -> InstallerResult<()> {
    if let Some(backup) = ledger.backup(shell, &file_edits.file).await? {
        report.backups.push(backup);
    }

    let mut text = match shell.read_file(&file_edits.file).await {
        Ok(text) => text,
        Err(InstallerError::FileNotFound(file)) => {
            warn!(file = %file, service = %report.service, "Config file not found, skipping");
            report.skipped.push(file);
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    info!(file = %file_edits.file, "Editing");

    let mut changed = false;
    for edit in &file_edits.edits {
        let (updated, outcome) = match kind {
            EditKind::Single => ini::set_single_value(&text, &edit.section, &edit.key, &edit.value),
            EditKind::Multi => ini::add_multi_value(&text, &edit.section, &edit.key, &edit.value),
        };
        if outcome.changed() {
            info!(section = %edit.section, key = %edit.key, value = %edit.value, ?outcome, "Set");
            changed = true;
            text = updated;
        } else {
            info!(key = %edit.key, ?outcome, "No changes required");
        }
        report.edits.push(EditRecord {
            file: file_edits.file.clone(),
            section: edit.section.clone(),
            key: edit.key.clone(),
            outcome,
        });
    }

    if changed {
        shell.write_file(&file_edits.file, &text).await?;
        metrics::counter!("installer.files_edited").increment(1);
    }
    Ok(())
}

async fn upload_template(
    shell: &dyn RemoteShell,
    ledger: &mut BackupLedger,
    template_dir: &Path,
    upload: &TemplateUpload,
    report: &mut ServiceReport,
) -> InstallerResult<()> {
    let source = template_dir.join(&upload.template);
    let body = match tokio::fs::read_to_string(&source).await {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let missing = InstallerError::TemplateMissing(source.display().to_string());
            warn!(error = %missing, "Skipping upload");
            report.skipped.push(source.display().to_string());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(backup) = ledger.backup(shell, &upload.file).await? {
        report.backups.push(backup);
    }
    let rendered = TemplateRenderer::render(&body, &upload.context);
    shell.write_file(&upload.file, &rendered).await?;
    info!(file = %upload.file, template = %upload.template, "Uploaded template");
    report.uploads.push(upload.file.clone());
    Ok(())
}

/// Single-value edits, multi-value edits, then template uploads. Each file is
/// backed up once before it is first touched. The service is not restarted
/// here.
pub async fn configure_service(
    shell: &dyn RemoteShell,
    profile: &ServiceProfile,
    backup_postfix: &str,
    template_dir: &Path,
) -> InstallerResult<ServiceReport> {
    info!(service = %profile.name, host = shell.target(), "Configuring");
    let mut ledger = BackupLedger::new(backup_postfix);
    let mut report = ServiceReport {
        service: profile.name.clone(),
        ..ServiceReport::default()
    };

    for file_edits in &profile.single_value_edits {
        apply_file_edits(shell, &mut ledger, file_edits, EditKind::Single, &mut report).await?;
    }
    for file_edits in &profile.multi_value_edits {
        apply_file_edits(shell, &mut ledger, file_edits, EditKind::Multi, &mut report).await?;
    }
    for upload in &profile.templates {
        upload_template(shell, &mut ledger, template_dir, upload, &mut report).await?;
    }

    Ok(report)
}

#[derive(Debug, Clone)]
pub struct StackOptions {
    /// Goldstone server address as seen from the OpenStack hosts.
    pub goldstone_addr: String,
    pub restart: bool,
    /// Holds one template subdirectory per service.
    pub template_root: PathBuf,
    /// Defaults to the current Unix timestamp.
    pub backup_postfix: Option<String>,
}

/// Configure rsyslog and every OpenStack service on one host. Failed restarts
/// are logged and do not stop the run.
pub async fn configure_stack(shell: &dyn RemoteShell, options: &StackOptions) -> InstallerResult<Vec<ServiceReport>> {
    let postfix = options
        .backup_postfix
        .clone()
        .unwrap_or_else(|| Utc::now().timestamp().to_string());

    let mut reports = Vec::new();
    for profile in profiles::stack_profiles(&options.goldstone_addr) {
        let template_dir = options.template_root.join(&profile.template_subdir);
        let mut report = configure_service(shell, &profile, &postfix, &template_dir).await?;

        if options.restart {
            info!(service = %profile.name, "Restarting");
            match shell.run(&profile.restart_command).await {
                Ok(_) => report.restarted = true,
                Err(e) => warn!(service = %profile.name, error = %e, "Restart failed"),
            }
        } else {
            info!(service = %profile.name, "Restart to apply changes");
        }
        reports.push(report);
    }

    metrics::counter!("installer.stack_runs").increment(1);
    info!(host = shell.target(), services = reports.len(), "Finished");
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::ConfigEdit;
    use crate::shell::CommandOutput;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// In-memory host: `test -f`, `cat`, `cat >` and `cp` against a map.
    #[derive(Default)]
    struct FakeHost {
        files: Mutex<HashMap<String, String>>,
        commands: Mutex<Vec<String>>,
        failing: HashSet<String>,
    }

    fn unquote(s: &str) -> String {
        s.trim().trim_matches('\'').to_string()
    }

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            status: 0,
            stdout: stdout.as_bytes().to_vec(),
            stderr: String::new(),
        }
    }

    fn fail() -> CommandOutput {
        CommandOutput {
            status: 1,
            stdout: Vec::new(),
            stderr: "failed".into(),
        }
    }

    #[async_trait]
    impl RemoteShell for FakeHost {
        fn target(&self) -> &str {
            "fake"
        }

        async fn exec(&self, command: &str, stdin: Option<&[u8]>) -> InstallerResult<CommandOutput> {
            self.commands.lock().unwrap().push(command.to_string());
            let mut files = self.files.lock().unwrap();
            if let Some(path) = command.strip_prefix("test -f ") {
                return Ok(if files.contains_key(&unquote(path)) { ok("") } else { fail() });
            }
            if let Some(path) = command.strip_prefix("cat > ") {
                let body = String::from_utf8(stdin.unwrap_or_default().to_vec()).unwrap();
                files.insert(unquote(path), body);
                return Ok(ok(""));
            }
            if let Some(path) = command.strip_prefix("cat ") {
                return Ok(match files.get(&unquote(path)) {
                    Some(body) => ok(body),
                    None => fail(),
                });
            }
            if let Some(args) = command.strip_prefix("cp ") {
                let (from, to) = args.split_once(' ').unwrap();
                let body = files.get(&unquote(from)).cloned().unwrap();
                files.insert(unquote(to), body);
                return Ok(ok(""));
            }
            Ok(if self.failing.contains(command) { fail() } else { ok("") })
        }
    }

    fn nova_conf() -> String {
        "[DEFAULT]\nverbose = False\nnotification_driver =\n".to_string()
    }

    #[tokio::test]
    async fn test_configure_service_edits_and_backs_up() {
        let host = FakeHost::default();
        host.files
            .lock()
            .unwrap()
            .insert("/etc/nova/nova.conf".into(), nova_conf());

        let templates = tempfile::tempdir().unwrap();
        std::fs::write(templates.path().join("api-paste.ini.template"), "[composite:osapi]\n").unwrap();

        let report = configure_service(&host, &profiles::nova(), "1420070400", templates.path())
            .await
            .unwrap();

        let files = host.files.lock().unwrap();
        assert_eq!(files["/etc/nova/nova.conf.1420070400"], nova_conf());
        let conf = &files["/etc/nova/nova.conf"];
        assert!(conf.contains("syslog_log_facility = LOG_LOCAL0"));
        assert!(conf.contains("verbose = True"));
        assert!(conf.contains("instance_usage_audit_period = hour"));
        assert!(conf.contains("notification_driver = messagingv2"));
        assert_eq!(files["/etc/nova/api-paste.ini"], "[composite:osapi]\n");

        // Single backup even though nova.conf takes two passes.
        assert_eq!(report.backups, vec!["/etc/nova/nova.conf.1420070400".to_string()]);
        assert_eq!(report.uploads, vec!["/etc/nova/api-paste.ini".to_string()]);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].ends_with("nova_api_audit_map.conf.template"));
        assert_eq!(report.edits.last().unwrap().outcome, EditOutcome::ReplacedEmpty);
    }

    #[tokio::test]
    async fn test_missing_config_file_skipped() {
        let host = FakeHost::default();
        let profile = ServiceProfile {
            name: "Neutron".into(),
            template_subdir: "neutron".into(),
            single_value_edits: vec![FileEdits {
                file: "/etc/neutron/neutron.conf".into(),
                edits: vec![ConfigEdit {
                    section: "DEFAULT".into(),
                    key: "verbose".into(),
                    value: "True".into(),
                }],
            }],
            multi_value_edits: Vec::new(),
            templates: Vec::new(),
            restart_command: "true".into(),
        };

        let report = configure_service(&host, &profile, "1", Path::new("/nonexistent"))
            .await
            .unwrap();
        assert_eq!(report.skipped, vec!["/etc/neutron/neutron.conf".to_string()]);
        assert!(report.edits.is_empty());
        assert!(report.backups.is_empty());
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let host = FakeHost::default();
        host.files
            .lock()
            .unwrap()
            .insert("/etc/keystone/keystone.conf".into(), "[DEFAULT]\n".into());
        let dir = Path::new("/nonexistent");

        configure_service(&host, &profiles::keystone(), "1", dir).await.unwrap();
        let first = host.files.lock().unwrap()["/etc/keystone/keystone.conf"].clone();
        let report = configure_service(&host, &profiles::keystone(), "2", dir).await.unwrap();

        assert_eq!(host.files.lock().unwrap()["/etc/keystone/keystone.conf"], first);
        assert!(report.edits.iter().all(|e| e.outcome == EditOutcome::Unchanged));
    }

    #[tokio::test]
    async fn test_configure_stack_restarts_in_order() {
        let host = FakeHost {
            failing: HashSet::from(["systemctl restart httpd".to_string()]),
            ..FakeHost::default()
        };
        let options = StackOptions {
            goldstone_addr: "10.0.0.5".into(),
            restart: true,
            template_root: PathBuf::from("/nonexistent"),
            backup_postfix: Some("42".into()),
        };

        let reports = configure_stack(&host, &options).await.unwrap();
        assert_eq!(reports.len(), 7);
        assert!(reports[0].restarted);
        assert!(!reports[6].restarted);

        let restarts: Vec<String> = host
            .commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.contains("restart"))
            .cloned()
            .collect();
        assert_eq!(
            restarts,
            vec![
                "service rsyslog restart",
                "openstack-service restart ceilometer",
                "openstack-service restart nova",
                "openstack-service restart neutron",
                "openstack-service restart cinder",
                "openstack-service restart glance",
                "systemctl restart httpd",
            ]
        );
    }
}
