//! Name validation.
//!
//! File names are flat, case-sensitive keys. Both the coordinator and the
//! storage nodes map them straight onto their own storage, so path
//! separators and `..` are rejected everywhere, on every name-bearing
//! operation. Checkpoint tags become file-name components on the storage
//! side and follow the same rules.

use crate::MsgError;

/// Maximum file-name length, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Maximum user-name length, in bytes.
pub const MAX_USERNAME_LEN: usize = 64;

/// Maximum checkpoint-tag length, in bytes.
pub const MAX_TAG_LEN: usize = 64;

/// Validates a file or folder name.
pub fn validate_name(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(MsgError::InvalidName("name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(MsgError::InvalidName("name is too long"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(MsgError::InvalidName("name contains a path separator"));
    }
    if name.contains("..") {
        return Err(MsgError::InvalidName("name contains '..'"));
    }
    Ok(())
}

/// Validates a user name. Same character rules as file names, shorter cap.
pub fn validate_username(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(MsgError::InvalidName("user name is empty"));
    }
    if name.len() > MAX_USERNAME_LEN {
        return Err(MsgError::InvalidName("user name is too long"));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") || name.contains('|') {
        return Err(MsgError::InvalidName("user name contains reserved characters"));
    }
    Ok(())
}

/// Validates a checkpoint tag.
pub fn validate_tag(tag: &str) -> crate::Result<()> {
    if tag.is_empty() {
        return Err(MsgError::InvalidName("tag is empty"));
    }
    if tag.len() > MAX_TAG_LEN {
        return Err(MsgError::InvalidName("tag is too long"));
    }
    if tag.contains('/') || tag.contains('\\') || tag.contains("..") {
        return Err(MsgError::InvalidName("tag contains reserved characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        assert!(validate_name("doc.txt").is_ok());
        assert!(validate_name("Notes").is_ok());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN)).is_ok());
    }

    #[test]
    fn rejects_traversal_and_separators() {
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("notes..txt").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn names_are_case_sensitive_keys() {
        // Both pass validation; the catalog treats them as distinct.
        assert!(validate_name("Doc").is_ok());
        assert!(validate_name("doc").is_ok());
    }

    #[test]
    fn usernames_reject_the_payload_separator() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("a|b").is_err());
        assert!(validate_username("").is_err());
    }
}
