//! The message envelope.
//!
//! Every request and response between any two peers is one `Message` record.
//! The transport layer prefixes each record with its byte length as a 32-bit
//! big-endian integer; the record itself is also big-endian throughout.

use binrw::io::{Read, Seek, Write};
use binrw::prelude::*;
use binrw::Endian;

use crate::op::OpCode;
use crate::status::Status;

/// Width of the fixed operation-tag field.
pub const TAG_LEN: usize = 16;

/// Upper bound for any single string field. The transport enforces a frame
/// cap as well; this one keeps a corrupt length prefix from ballooning an
/// allocation before the frame check can see it.
pub const MAX_FIELD_LEN: usize = 1 << 20;

/// The operation tag as it travels on the wire: ASCII, zero padded to
/// [`TAG_LEN`] bytes.
///
/// Unknown tags decode successfully and are surfaced as `None` from
/// [`RawTag::op`], so a peer sending garbage gets an error response instead
/// of a dropped connection.
#[binrw]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawTag(pub [u8; TAG_LEN]);

impl RawTag {
    pub fn new(tag: &str) -> Self {
        let mut bytes = [0u8; TAG_LEN];
        let len = tag.len().min(TAG_LEN);
        bytes[..len].copy_from_slice(&tag.as_bytes()[..len]);
        Self(bytes)
    }

    /// The tag text, without padding. Non-UTF-8 garbage reads as empty.
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(TAG_LEN);
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }

    /// The operation this tag names, if it is a known one.
    pub fn op(&self) -> Option<OpCode> {
        OpCode::from_tag(self.as_str())
    }
}

impl From<OpCode> for RawTag {
    fn from(op: OpCode) -> Self {
        Self::new(op.tag())
    }
}

impl std::fmt::Debug for RawTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawTag({:?})", self.as_str())
    }
}

impl std::fmt::Display for RawTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A length-prefixed UTF-8 string field (u32 length, then the bytes).
///
/// Decoding is lossy rather than failing: a peer that manages to smuggle
/// invalid UTF-8 into a field should get an application-level error, not
/// kill the session at the codec.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WireString(pub String);

impl WireString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl BinRead for WireString {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let pos = reader.stream_position()?;
        let len = u32::read_options(reader, endian, ())? as usize;
        if len > MAX_FIELD_LEN {
            return Err(binrw::Error::AssertFail {
                pos,
                message: format!("string field of {len} bytes exceeds the {MAX_FIELD_LEN} byte cap"),
            });
        }
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        Ok(Self(String::from_utf8_lossy(&buf).into_owned()))
    }
}

impl BinWrite for WireString {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        (self.0.len() as u32).write_options(writer, endian, ())?;
        writer.write_all(self.0.as_bytes())?;
        Ok(())
    }
}

impl From<&str> for WireString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for WireString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::ops::Deref for WireString {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WireString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One protocol record.
///
/// The same shape serves requests and responses: requests fill in the tag,
/// user, file, and payload; responses carry the payload plus the status code
/// and, on failure, a short error text.
#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub tag: RawTag,
    pub username: WireString,
    pub filename: WireString,
    pub payload: WireString,
    /// Raw status code. Use [`Message::status`] to convert to [`Status`].
    pub status: u32,
    pub error: WireString,
}

impl Message {
    /// Builds a request record.
    pub fn request(
        op: OpCode,
        username: impl Into<WireString>,
        filename: impl Into<WireString>,
        payload: impl Into<WireString>,
    ) -> Self {
        Self {
            tag: op.into(),
            username: username.into(),
            filename: filename.into(),
            payload: payload.into(),
            status: Status::Success as u32,
            error: WireString::default(),
        }
    }

    /// Builds a success response for `op`.
    pub fn reply_ok(op: OpCode, payload: impl Into<WireString>) -> Self {
        Self {
            tag: op.into(),
            username: WireString::default(),
            filename: WireString::default(),
            payload: payload.into(),
            status: Status::Success as u32,
            error: WireString::default(),
        }
    }

    /// Builds an error response for `op`.
    pub fn reply_err(op: OpCode, status: Status, error: impl Into<WireString>) -> Self {
        Self {
            tag: op.into(),
            username: WireString::default(),
            filename: WireString::default(),
            payload: WireString::default(),
            status: status as u32,
            error: error.into(),
        }
    }

    /// The operation named by the tag, if known.
    pub fn op(&self) -> Option<OpCode> {
        self.tag.op()
    }

    /// Tries to convert the raw [`status`][Self::status] field to a [`Status`].
    pub fn status(&self) -> crate::Result<Status> {
        self.status.try_into()
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Success as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn field(text: &str) -> Vec<u8> {
        let mut out = (text.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(text.as_bytes());
        out
    }

    #[test]
    fn encodes_the_documented_layout() {
        let msg = Message::request(OpCode::Create, "alice", "doc.txt", "");
        let mut out = Cursor::new(Vec::new());
        msg.write(&mut out).unwrap();

        let mut expected = b"CREATE".to_vec();
        expected.resize(TAG_LEN, 0);
        expected.extend(field("alice"));
        expected.extend(field("doc.txt"));
        expected.extend(field(""));
        expected.extend(0u32.to_be_bytes());
        expected.extend(field(""));
        assert_eq!(out.into_inner(), expected);
    }

    #[test]
    fn round_trips() {
        let msg = Message::reply_err(OpCode::WriteLock, Status::Locked, "held by bob");
        let mut buf = Cursor::new(Vec::new());
        msg.write(&mut buf).unwrap();
        buf.set_position(0);
        let back = Message::read(&mut buf).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.status().unwrap(), Status::Locked);
        assert!(!back.is_ok());
    }

    #[test]
    fn unknown_tag_decodes_but_has_no_op() {
        let mut msg = Message::request(OpCode::Read, "alice", "doc.txt", "");
        msg.tag = RawTag::new("EXEC");
        let mut buf = Cursor::new(Vec::new());
        msg.write(&mut buf).unwrap();
        buf.set_position(0);
        let back = Message::read(&mut buf).unwrap();
        assert_eq!(back.op(), None);
        assert_eq!(back.tag.as_str(), "EXEC");
    }

    #[test]
    fn oversized_field_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&RawTag::from(OpCode::Read).0);
        buf.extend(((MAX_FIELD_LEN + 1) as u32).to_be_bytes());
        assert!(Message::read(&mut Cursor::new(buf)).is_err());
    }
}
