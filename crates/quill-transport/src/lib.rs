//! Framed TCP transport shared by all three peers.
//!
//! Every message travels as one frame: a 32-bit big-endian byte length,
//! then the encoded [`Message`][quill_msg::Message] record. The same
//! [`Transport`] type serves coordinator sessions, storage-node sessions,
//! and client-side connections; servers obtain theirs from a [`Listener`].

#![forbid(unsafe_code)]

pub mod codec;
pub mod conn;
pub mod error;

pub use codec::{MessageCodec, MAX_FRAME_SIZE};
pub use conn::{Listener, Transport};
pub use error::TransportError;

/// Transport-layer result type.
pub type Result<T> = std::result::Result<T, TransportError>;
