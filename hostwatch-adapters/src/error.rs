//! Error types for adapters.

use thiserror::Error;

/// Errors that can occur when querying a metrics backend.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The backend rejected the request (4xx). Retrying cannot help.
    #[error("Client error '{status}' for url '{url}'")]
    ClientSide { status: u16, url: String },

    /// The backend failed to serve the request (5xx).
    #[error("Server error '{status}' for url '{url}'")]
    ServerSide { status: u16, url: String },

    /// Transport-level failure (connect, reset, body read).
    #[error("Connection failed: {0}")]
    Network(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// The backend answered with a body that is not a query response.
    #[error("Failed to parse response: {0}")]
    Decode(String),

    /// Every attempt failed with a transient error.
    #[error("Failed to fetch data from {target} after {attempts} attempts")]
    Exhausted {
        target: String,
        attempts: u32,
        #[source]
        last: Box<QueryError>,
    },

    /// The client could not be constructed.
    #[error("Invalid client configuration: {0}")]
    Config(String),
}

/// Classification of a [`QueryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ClientSide,
    ServerSide,
    Network,
    Timeout,
    Decode,
    Exhausted,
    Config,
}

impl QueryError {
    /// The classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::ClientSide { .. } => ErrorKind::ClientSide,
            QueryError::ServerSide { .. } => ErrorKind::ServerSide,
            QueryError::Network(_) => ErrorKind::Network,
            QueryError::Timeout => ErrorKind::Timeout,
            QueryError::Decode(_) => ErrorKind::Decode,
            QueryError::Exhausted { .. } => ErrorKind::Exhausted,
            QueryError::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ServerSide | ErrorKind::Network | ErrorKind::Timeout
        )
    }
}

#[cfg(feature = "prometheus")]
impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            QueryError::Timeout
        } else if err.is_decode() {
            QueryError::Decode(err.to_string())
        } else if err.is_builder() {
            QueryError::Config(err.to_string())
        } else {
            QueryError::Network(err.to_string())
        }
    }
}
