//! Permission bits for access grants.

use modular_bitfield::prelude::*;

/// Permissions attached to an access grant.
///
/// The wire representation is the low byte: bit 0 is read, bit 1 is write.
/// Valid grant values are 1 (read), 2 (write), and 3 (read and write); 0
/// never appears in a grant.
#[bitfield]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AccessMask {
    pub read: bool,
    pub write: bool,
    #[skip]
    __: B6,
}

impl AccessMask {
    pub fn read_only() -> Self {
        Self::new().with_read(true)
    }

    pub fn write_only() -> Self {
        Self::new().with_write(true)
    }

    pub fn read_write() -> Self {
        Self::new().with_read(true).with_write(true)
    }

    /// The numeric form used in payloads and in the catalog.
    pub fn bits(&self) -> u8 {
        self.into_bytes()[0]
    }

    /// Parses the numeric form, rejecting values with no valid bits set.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1..=3 => Some(Self::from_bytes([bits])),
            _ => None,
        }
    }

    /// Whether this grant covers everything `required` asks for.
    pub fn satisfies(&self, required: AccessMask) -> bool {
        self.bits() & required.bits() == required.bits()
    }
}

impl std::fmt::Debug for AccessMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessMask")
            .field("read", &self.read())
            .field("write", &self.write())
            .finish()
    }
}

impl std::fmt::Display for AccessMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.read(), self.write()) {
            (true, true) => f.write_str("READ+WRITE"),
            (true, false) => f.write_str("READ"),
            (false, true) => f.write_str("WRITE"),
            (false, false) => f.write_str("NONE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values() {
        assert_eq!(AccessMask::read_only().bits(), 1);
        assert_eq!(AccessMask::write_only().bits(), 2);
        assert_eq!(AccessMask::read_write().bits(), 3);
    }

    #[test]
    fn from_bits_rejects_out_of_range() {
        assert!(AccessMask::from_bits(0).is_none());
        assert!(AccessMask::from_bits(4).is_none());
        assert_eq!(AccessMask::from_bits(3), Some(AccessMask::read_write()));
    }

    #[test]
    fn satisfies_is_a_superset_check() {
        let rw = AccessMask::read_write();
        assert!(rw.satisfies(AccessMask::read_only()));
        assert!(rw.satisfies(AccessMask::write_only()));
        assert!(!AccessMask::read_only().satisfies(AccessMask::write_only()));
        assert!(!AccessMask::write_only().satisfies(AccessMask::read_write()));
    }
}
