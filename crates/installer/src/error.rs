use goldstone_core::GoldstoneError;
use thiserror::Error;

pub type InstallerResult<T> = Result<T, InstallerError>;

#[derive(Error, Debug)]
pub enum InstallerError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Command `{command}` on {target} exited with {status}: {stderr}")]
    Command {
        target: String,
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Template {0} not found")]
    TemplateMissing(String),

    #[error("Remote output is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<InstallerError> for GoldstoneError {
    fn from(e: InstallerError) -> Self {
        match e {
            InstallerError::Io(io) => GoldstoneError::Io(io),
            other => GoldstoneError::Remote(other.to_string()),
        }
    }
}
