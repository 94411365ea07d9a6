use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse submission JSON: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Invalid submission: {0}")]
    ValidationError(String),

    #[error("Invalid transition: cannot {op} '{id}' while in state {state}")]
    InvalidTransition {
        op: &'static str,
        id: String,
        state: String,
    },

    #[error("'{0}' is not yet eligible to run: {1}")]
    NotYetEligible(String, String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),
}

impl Error {
    /// True for errors the caller is expected to retry later, e.g. a job
    /// waiting for its reservation window to open.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::NotYetEligible(_, _))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
