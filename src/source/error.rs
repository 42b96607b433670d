use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceError {
    /// The record id is unknown upstream.
    NotFound(String),
    /// The upstream returned a non-success response or was unreachable.
    Transport {
        status: Option<u16>,
        message: String,
    },
    /// The upstream responded with a payload this client cannot use.
    Decode(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::NotFound(record_id) => {
                write!(f, "post {} not found on server", record_id)
            }
            SourceError::Transport {
                status: Some(status),
                message,
            } => write!(f, "transport error (status {}): {}", status, message),
            SourceError::Transport {
                status: None,
                message,
            } => write!(f, "transport error: {}", message),
            SourceError::Decode(message) => write!(f, "undecodable payload: {}", message),
        }
    }
}

impl std::error::Error for SourceError {}
