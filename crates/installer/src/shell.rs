//! Command execution on the host being configured.
//!
//! Every operation is expressed as a shell command so the same code drives a
//! remote host over `ssh` and the local machine through `sh -c`.

use crate::error::{InstallerError, InstallerResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Single-quote `s` for a POSIX shell.
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Where commands run, for log lines and errors.
    fn target(&self) -> &str;

    /// Run `command`, optionally feeding `stdin`. A non-zero exit is not an
    /// error at this level.
    async fn exec(&self, command: &str, stdin: Option<&[u8]>) -> InstallerResult<CommandOutput>;

    /// Run `command` and fail on a non-zero exit.
    async fn run(&self, command: &str) -> InstallerResult<CommandOutput> {
        let out = self.exec(command, None).await?;
        if !out.success() {
            return Err(InstallerError::Command {
                target: self.target().to_string(),
                command: command.to_string(),
                status: out.status,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out)
    }

    async fn exists(&self, path: &str) -> InstallerResult<bool> {
        let out = self.exec(&format!("test -f {}", quote(path)), None).await?;
        Ok(out.success())
    }

    async fn read_file(&self, path: &str) -> InstallerResult<String> {
        if !self.exists(path).await? {
            return Err(InstallerError::FileNotFound(path.to_string()));
        }
        let out = self.run(&format!("cat {}", quote(path))).await?;
        Ok(String::from_utf8(out.stdout)?)
    }

    async fn write_file(&self, path: &str, contents: &str) -> InstallerResult<()> {
        let command = format!("cat > {}", quote(path));
        let out = self.exec(&command, Some(contents.as_bytes())).await?;
        if !out.success() {
            return Err(InstallerError::Command {
                target: self.target().to_string(),
                command,
                status: out.status,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> InstallerResult<()> {
        self.run(&format!("cp {} {}", quote(from), quote(to))).await?;
        Ok(())
    }
}

async fn spawn(mut cmd: Command, stdin: Option<&[u8]>) -> InstallerResult<CommandOutput> {
    cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input).await?;
        pipe.shutdown().await?;
    }
    let output = child.wait_with_output().await?;

    Ok(CommandOutput {
        status: output.status.code().unwrap_or(-1),
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Runs commands on `user@host` through the system `ssh` client.
pub struct SshShell {
    destination: String,
    port: Option<u16>,
    identity: Option<String>,
}

impl SshShell {
    pub fn new(host: &str, user: Option<&str>) -> Self {
        Self {
            destination: format!("{}@{}", user.unwrap_or("root"), host),
            port: None,
            identity: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    fn command(&self, remote: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o").arg("BatchMode=yes");
        if let Some(port) = self.port {
            cmd.arg("-p").arg(port.to_string());
        }
        if let Some(identity) = &self.identity {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(&self.destination).arg(remote);
        cmd
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    fn target(&self) -> &str {
        &self.destination
    }

    async fn exec(&self, command: &str, stdin: Option<&[u8]>) -> InstallerResult<CommandOutput> {
        debug!(host = %self.destination, command, "ssh");
        spawn(self.command(command), stdin).await
    }
}

/// Runs commands on this machine.
#[derive(Default)]
pub struct LocalShell;

#[async_trait]
impl RemoteShell for LocalShell {
    fn target(&self) -> &str {
        "localhost"
    }

    async fn exec(&self, command: &str, stdin: Option<&[u8]>) -> InstallerResult<CommandOutput> {
        debug!(command, "sh");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        spawn(cmd, stdin).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote("/etc/nova/nova.conf"), "'/etc/nova/nova.conf'");
        assert_eq!(quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_ssh_destination() {
        assert_eq!(SshShell::new("10.0.0.2", None).target(), "root@10.0.0.2");
        assert_eq!(SshShell::new("ctrl", Some("stack")).target(), "stack@ctrl");
    }

    #[tokio::test]
    async fn test_local_file_ops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nova.conf");
        let path = path.to_str().unwrap();
        let shell = LocalShell;

        assert!(!shell.exists(path).await.unwrap());
        assert!(matches!(
            shell.read_file(path).await,
            Err(InstallerError::FileNotFound(_))
        ));

        shell.write_file(path, "[DEFAULT]\nverbose = True\n").await.unwrap();
        assert!(shell.exists(path).await.unwrap());
        assert_eq!(shell.read_file(path).await.unwrap(), "[DEFAULT]\nverbose = True\n");

        let copy = format!("{path}.bak");
        shell.copy(path, &copy).await.unwrap();
        assert_eq!(shell.read_file(&copy).await.unwrap(), "[DEFAULT]\nverbose = True\n");
    }

    #[tokio::test]
    async fn test_failed_command() {
        let err = LocalShell.run("exit 3").await.unwrap_err();
        assert!(matches!(err, InstallerError::Command { status: 3, .. }));
    }
}
