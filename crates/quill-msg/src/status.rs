//! Stable numeric status codes.

use std::fmt;

macro_rules! make_status {
    (
        $($name:ident = $value:literal: $description:literal,)+
    ) => {

/// Response status codes.
///
/// The numeric values are stable across releases; peers compare the raw
/// integer carried in the envelope, so variants must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Status {
    $(
        #[doc = concat!($description, " (", stringify!($value), ")")]
        $name = $value,
    )+
}

impl Status {
    /// A human readable description of the status.
    pub fn description(&self) -> &'static str {
        match self {
            $(Status::$name => $description,)+
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), *self as u32)
    }
}

impl TryFrom<u32> for Status {
    type Error = crate::MsgError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            $($value => Ok(Status::$name),)+
            other => Err(crate::MsgError::UnknownStatus(other)),
        }
    }
}
    };
}

make_status! {
    Success = 0: "Success",
    FileNotFound = 1: "File not found",
    FileExists = 2: "File already exists",
    PermissionDenied = 3: "Permission denied",
    Locked = 4: "Resource is locked",
    InvalidParam = 5: "Invalid parameters",
    ServerError = 6: "Server error",
    NotOwner = 7: "Not file owner",
    UserNotFound = 8: "User not found",
    StorageUnavailable = 9: "Storage node not available",
    ConnectionFailed = 10: "Connection failed",
    FolderNotFound = 11: "Folder not found",
    CheckpointNotFound = 12: "Checkpoint not found",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Status::Success as u32, 0);
        assert_eq!(Status::Locked as u32, 4);
        assert_eq!(Status::StorageUnavailable as u32, 9);
        assert_eq!(Status::CheckpointNotFound as u32, 12);
    }

    #[test]
    fn round_trip() {
        for code in 0..=12u32 {
            let status = Status::try_from(code).unwrap();
            assert_eq!(status as u32, code);
        }
        assert!(Status::try_from(13).is_err());
    }
}
