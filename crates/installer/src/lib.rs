//! Prepares OpenStack hosts to feed Goldstone: syslog facilities,
//! notification drivers, ceilometer event storage and audit middleware
//! templates, plus the rsyslog forwarder.
//!
//! Config files are edited as text through a [`RemoteShell`], with one backup
//! per file per run.

pub mod backup;
pub mod configure;
pub mod error;
pub mod ini;
pub mod profiles;
pub mod shell;

pub use backup::BackupLedger;
pub use configure::{configure_service, configure_stack, ServiceReport, StackOptions};
pub use error::{InstallerError, InstallerResult};
pub use ini::EditOutcome;
pub use profiles::ServiceProfile;
pub use shell::{LocalShell, RemoteShell, SshShell};
