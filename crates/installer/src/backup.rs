use crate::error::InstallerResult;
use crate::shell::RemoteShell;
use std::collections::HashSet;
use tracing::info;

/// Copies each config file to `<file>.<postfix>` before its first edit in a
/// run. Files that do not exist are not recorded, so a later attempt still
/// backs them up once they appear.
pub struct BackupLedger {
    postfix: String,
    backed_up: HashSet<String>,
}

impl BackupLedger {
    pub fn new(postfix: impl Into<String>) -> Self {
        Self {
            postfix: postfix.into(),
            backed_up: HashSet::new(),
        }
    }

    pub fn postfix(&self) -> &str {
        &self.postfix
    }

    pub fn backup_name(&self, file: &str) -> String {
        format!("{file}.{}", self.postfix)
    }

    /// Back `file` up unless already done. Returns the backup path when a
    /// copy was made.
    pub async fn backup(&mut self, shell: &dyn RemoteShell, file: &str) -> InstallerResult<Option<String>> {
        if self.backed_up.contains(file) || !shell.exists(file).await? {
            return Ok(None);
        }

        let target = self.backup_name(file);
        shell.copy(file, &target).await?;
        info!(file, backup = %target, "Backed up config file");
        metrics::counter!("installer.backups").increment(1);
        self.backed_up.insert(file.to_string());
        Ok(Some(target))
    }

    pub fn is_backed_up(&self, file: &str) -> bool {
        self.backed_up.contains(file)
    }
}
