//! Registered-user directory.
//!
//! In-memory, like the lock table: users re-register on connect and the
//! directory empties on coordinator restart.

use std::collections::BTreeMap;

use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Registration {
    Added,
    Known,
    Full,
}

#[derive(Debug)]
pub struct UserDirectory {
    users: BTreeMap<String, OffsetDateTime>,
    cap: usize,
}

impl UserDirectory {
    pub fn new(cap: usize) -> Self {
        Self {
            users: BTreeMap::new(),
            cap,
        }
    }

    pub fn register(&mut self, name: &str, now: OffsetDateTime) -> Registration {
        if self.users.contains_key(name) {
            return Registration::Known;
        }
        if self.users.len() >= self.cap {
            return Registration::Full;
        }
        self.users.insert(name.to_string(), now);
        Registration::Added
    }

    pub fn contains(&self, name: &str) -> bool {
        self.users.contains_key(name)
    }

    /// User names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
