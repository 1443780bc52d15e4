//! Length-prefixed message codec.

use std::io::Cursor;

use binrw::prelude::*;
use quill_msg::Message;
use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::TransportError;

/// Upper bound for a single frame, excluding the length prefix.
pub const MAX_FRAME_SIZE: usize = 2 * 1024 * 1024;

/// Codec turning a byte stream into [`Message`] records and back.
///
/// The length prefix is a `u32` in network byte order and counts the record
/// bytes only.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_frame: usize,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self {
            max_frame: MAX_FRAME_SIZE,
        }
    }

    /// Mostly for tests that want to exercise the frame cap cheaply.
    pub fn with_max_frame(max_frame: usize) -> Self {
        Self { max_frame }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, TransportError> {
        if src.len() < 4 {
            return Ok(None);
        }
        let mut prefix = [0u8; 4];
        prefix.copy_from_slice(&src[..4]);
        let len = u32::from_be_bytes(prefix) as usize;
        if len > self.max_frame {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_frame,
            });
        }
        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }
        src.advance(4);
        let frame = src.split_to(len);
        let msg = Message::read(&mut Cursor::new(frame.as_ref()))?;
        Ok(Some(msg))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = TransportError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), TransportError> {
        let mut body = Cursor::new(Vec::new());
        msg.write(&mut body)?;
        let body = body.into_inner();
        if body.len() > self.max_frame {
            return Err(TransportError::FrameTooLarge {
                len: body.len(),
                max: self.max_frame,
            });
        }
        dst.reserve(4 + body.len());
        dst.extend_from_slice(&(body.len() as u32).to_be_bytes());
        dst.extend_from_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_msg::OpCode;

    #[test]
    fn round_trips_through_a_buffer() {
        let mut codec = MessageCodec::new();
        let msg = Message::request(OpCode::Create, "alice", "doc.txt", "");

        let mut buf = BytesMut::new();
        codec.encode(msg.clone(), &mut buf).unwrap();
        let back = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(back, msg);
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_a_complete_frame() {
        let mut codec = MessageCodec::new();
        let msg = Message::request(OpCode::View, "alice", "", "-a");

        let mut full = BytesMut::new();
        codec.encode(msg.clone(), &mut full).unwrap();

        let mut partial = BytesMut::new();
        for chunk in full.chunks(3) {
            assert!(codec.decode(&mut partial).is_ok());
            partial.extend_from_slice(chunk);
        }
        assert_eq!(codec.decode(&mut partial).unwrap(), Some(msg));
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut codec = MessageCodec::new();
        let first = Message::request(OpCode::Read, "alice", "a", "");
        let second = Message::request(OpCode::Read, "bob", "b", "");

        let mut buf = BytesMut::new();
        codec.encode(first.clone(), &mut buf).unwrap();
        codec.encode(second.clone(), &mut buf).unwrap();
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(first));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(second));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn rejects_oversized_frames() {
        let mut codec = MessageCodec::with_max_frame(64);
        let msg = Message::request(OpCode::Write, "alice", "doc.txt", "x".repeat(128));
        assert!(matches!(
            codec.encode(msg, &mut BytesMut::new()),
            Err(TransportError::FrameTooLarge { .. })
        ));

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&1_000_000u32.to_be_bytes());
        assert!(matches!(
            codec.decode(&mut buf),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }
}
