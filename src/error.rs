use thiserror::Error;

/// Recoverable error surface of the parameter server.
///
/// Protocol violations (unknown message class, push for a key that was never
/// pulled, shutdown with callbacks outstanding) are bugs, not errors; those
/// abort the process with a diagnostic instead of appearing here.
#[derive(Error, Debug)]
pub enum PsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Cluster error: {0}")]
    Cluster(String),

    #[error("Instance parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for PsError {
    fn from(e: serde_json::Error) -> Self {
        PsError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PsError>;
