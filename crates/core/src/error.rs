use thiserror::Error;

/// Errors raised while fetching presence data or maintaining the log table
#[derive(Error, Debug)]
pub enum PresenceError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Endpoint returned error status: {0}")]
    Status(u16),

    #[error("Failed to decode user list: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed presence table: {0}")]
    MalformedTable(String),
}

impl From<serde_json::Error> for PresenceError {
    fn from(err: serde_json::Error) -> Self {
        PresenceError::Decode(err.to_string())
    }
}
