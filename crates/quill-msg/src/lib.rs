//! Wire-level types shared by the coordinator, storage nodes, and clients.
//!
//! Everything here is pure data: the message envelope, the operation tags,
//! the stable status codes, and the small ASCII payload grammars that ride
//! inside the envelope. Framing (the length prefix) lives in
//! `quill-transport`; this crate only defines what a single record looks
//! like once the frame has been stripped.

#![forbid(unsafe_code)]

pub mod access;
pub mod message;
pub mod name;
pub mod op;
pub mod payload;
pub mod status;
pub mod text;

pub use access::AccessMask;
pub use message::{Message, RawTag, WireString};
pub use op::OpCode;
pub use payload::{CheckpointCmd, Endpoint, GrantArg, NodeAssigned, Redirect};
pub use status::Status;

use thiserror::Error;

/// Errors produced while interpreting wire data.
#[derive(Debug, Error)]
pub enum MsgError {
    #[error("unknown operation tag {0:?}")]
    UnknownTag(String),

    #[error("status code {0} is not defined")]
    UnknownStatus(u32),

    #[error("malformed {kind} payload: {text:?}")]
    MalformedPayload { kind: &'static str, text: String },

    #[error("invalid name: {0}")]
    InvalidName(&'static str),
}

/// Message-layer result type.
pub type Result<T> = std::result::Result<T, MsgError>;
