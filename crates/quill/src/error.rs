use quill_msg::Status;
use thiserror::Error;

/// Errors surfaced by the coordinator, storage node, and client layers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] quill_transport::TransportError),

    #[error("message error: {0}")]
    Msg(#[from] quill_msg::MsgError),

    #[error("catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A peer answered with a non-success status.
    #[error("{message} ({code})")]
    Remote { code: Status, message: String },

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// The remote status code, when this error is a peer's refusal.
    pub fn remote_status(&self) -> Option<Status> {
        match self {
            Error::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }
}
