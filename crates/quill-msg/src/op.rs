//! Operation tags.
//!
//! Every request names its operation with a short ASCII tag. The tag set is
//! part of the wire contract: both storage nodes and clients match on it.

use std::fmt;

macro_rules! make_ops {
    (
        $($name:ident = $tag:literal: $description:literal,)+
    ) => {

/// An operation carried by a [`Message`][crate::Message].
///
/// On the wire the tag travels as a fixed-width ASCII field; see
/// [`RawTag`][crate::RawTag] for the encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    $(
        #[doc = concat!($description, " (`", $tag, "`)")]
        $name,
    )+
}

impl OpCode {
    /// All defined operations, in declaration order.
    pub const ALL: &'static [OpCode] = &[$(OpCode::$name,)+];

    /// The ASCII tag sent on the wire.
    pub fn tag(&self) -> &'static str {
        match self {
            $(OpCode::$name => $tag,)+
        }
    }

    /// Looks an operation up by its wire tag.
    pub fn from_tag(tag: &str) -> Option<OpCode> {
        match tag {
            $($tag => Some(OpCode::$name),)+
            _ => None,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
    };
}

make_ops! {
    RegisterNode = "REGISTER_SS": "Storage node announces itself to the coordinator",
    RegisterClient = "REGISTER_CLIENT": "Client registers its user name",
    Create = "CREATE": "Create a file",
    CreateFolder = "CREATEFOLDER": "Create a folder",
    Read = "READ": "Read file contents",
    WriteLock = "WRITE_LOCK": "Acquire a sentence lock",
    Write = "WRITE": "Apply new content on a storage node",
    WriteCommit = "ETIRW": "Commit a sentence edit, releasing the lock",
    Delete = "DELETE": "Delete a file",
    View = "VIEW": "List files",
    List = "LIST": "List registered users",
    Info = "INFO": "File metadata counters",
    Stream = "STREAM": "Stream file contents word by word",
    Undo = "UNDO": "Restore the previous content snapshot",
    AddAccess = "ADDACCESS": "Grant access to another user",
    RemAccess = "REMACCESS": "Revoke a previously granted access",
    RequestAccess = "REQUESTACCESS": "File access request",
    ViewRequests = "VIEWREQUESTS": "List pending access requests",
    ApproveAccess = "APPROVEACCESS": "Mark an access request approved",
    RejectAccess = "REJECTACCESS": "Mark an access request rejected",
    Checkpoint = "CHECKPOINT": "Checkpoint sub-command (create/list/revert)",
    ListCheckpoints = "LISTCHECKPOINTS": "List checkpoints of a file",
    Revert = "REVERT": "Revert a file to a checkpoint",
    Replicate = "REPLICATE": "Push content to a replica node",
    Heartbeat = "HEARTBEAT": "Storage node liveness beacon",
    StreamWord = "STREAM_WORD": "One word of a streamed file",
    StreamEnd = "STREAM_END": "End marker of a word stream",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for op in OpCode::ALL {
            assert_eq!(OpCode::from_tag(op.tag()), Some(*op));
        }
    }

    #[test]
    fn tags_fit_the_wire_field() {
        for op in OpCode::ALL {
            assert!(op.tag().len() <= crate::message::TAG_LEN, "{op}");
        }
    }

    #[test]
    fn unknown_tag_is_none() {
        assert_eq!(OpCode::from_tag("EXEC"), None);
        assert_eq!(OpCode::from_tag(""), None);
    }

    #[test]
    fn commit_tag_is_reversed_write() {
        assert_eq!(OpCode::WriteCommit.tag(), "ETIRW");
    }
}
