use thiserror::Error;

pub type GoldstoneResult<T> = Result<T, GoldstoneError>;

#[derive(Error, Debug)]
pub enum GoldstoneError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Search backend error: {0}")]
    Search(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Remote execution error: {0}")]
    Remote(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GoldstoneError {
    /// Messages suitable for a 400 response body.
    pub fn messages(&self) -> Vec<String> {
        match self {
            GoldstoneError::Validation(errors) => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}
