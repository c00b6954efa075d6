use thiserror::Error;

/// Errors talking to an Endstate server.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Another message of this session is still being processed.
    #[error("Session is busy: {0}")]
    Busy(String),

    #[error("Failed to decode server response: {0}")]
    Decode(String),

    #[error(transparent)]
    Core(#[from] endstate_core::EndstateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl ClientError {
    /// Whether the request may have never reached the server and can be retried.
    pub fn is_transport(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            ClientError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
