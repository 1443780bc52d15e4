//! The sentence lock table.
//!
//! One entry per `(file, sentence index)`. The holder is a session, not a
//! user: two connections of the same user are distinct holders. Locks live
//! in memory only and die with the coordinator process.

use std::collections::HashMap;

use time::OffsetDateTime;

use super::SessionId;

#[derive(Clone, Debug)]
pub struct SentenceLock {
    pub file: String,
    pub sentence: u32,
    pub user: String,
    pub session: SessionId,
    pub acquired_at: OffsetDateTime,
}

/// Outcome of a lock acquisition attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Acquire {
    /// Fresh lock inserted.
    Granted,
    /// The same session already holds this lock.
    Reacquired,
    /// A different session holds it; `holder` is that session's user.
    Busy { holder: String },
    /// The table is at capacity.
    TableFull,
}

#[derive(Debug)]
pub struct LockTable {
    locks: HashMap<(String, u32), SentenceLock>,
    cap: usize,
}

impl LockTable {
    pub fn new(cap: usize) -> Self {
        Self {
            locks: HashMap::new(),
            cap,
        }
    }

    pub fn acquire(
        &mut self,
        file: &str,
        sentence: u32,
        user: &str,
        session: SessionId,
        now: OffsetDateTime,
    ) -> Acquire {
        let key = (file.to_string(), sentence);
        if let Some(existing) = self.locks.get(&key) {
            if existing.session == session {
                return Acquire::Reacquired;
            }
            return Acquire::Busy {
                holder: existing.user.clone(),
            };
        }
        if self.locks.len() >= self.cap {
            return Acquire::TableFull;
        }
        self.locks.insert(
            key,
            SentenceLock {
                file: file.to_string(),
                sentence,
                user: user.to_string(),
                session,
                acquired_at: now,
            },
        );
        Acquire::Granted
    }

    /// Releases a lock iff all four of file, sentence, user, and session
    /// match. Returns whether anything was released.
    pub fn release(&mut self, file: &str, sentence: u32, user: &str, session: SessionId) -> bool {
        let key = (file.to_string(), sentence);
        match self.locks.get(&key) {
            Some(lock) if lock.user == user && lock.session == session => {
                self.locks.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Drops every lock held by `session`, returning the freed keys.
    pub fn release_session(&mut self, session: SessionId) -> Vec<(String, u32)> {
        let freed: Vec<_> = self
            .locks
            .iter()
            .filter(|(_, lock)| lock.session == session)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &freed {
            self.locks.remove(key);
        }
        freed
    }

    /// Drops every lock on `file` (the file is being deleted).
    pub fn release_file(&mut self, file: &str) -> usize {
        let before = self.locks.len();
        self.locks.retain(|(name, _), _| name != file);
        before - self.locks.len()
    }

    pub fn holder(&self, file: &str, sentence: u32) -> Option<&SentenceLock> {
        self.locks.get(&(file.to_string(), sentence))
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LockTable {
        LockTable::new(4)
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    const A: SessionId = SessionId(1);
    const B: SessionId = SessionId(2);

    #[test]
    fn acquire_is_idempotent_per_session() {
        let mut locks = table();
        assert_eq!(locks.acquire("doc", 0, "alice", A, now()), Acquire::Granted);
        assert_eq!(locks.acquire("doc", 0, "alice", A, now()), Acquire::Reacquired);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn same_user_different_session_conflicts() {
        let mut locks = table();
        locks.acquire("doc", 0, "alice", A, now());
        assert_eq!(
            locks.acquire("doc", 0, "alice", B, now()),
            Acquire::Busy {
                holder: "alice".to_string()
            }
        );
    }

    #[test]
    fn release_matches_all_four_fields() {
        let mut locks = table();
        locks.acquire("doc", 0, "alice", A, now());
        assert!(!locks.release("doc", 0, "alice", B));
        assert!(!locks.release("doc", 0, "bob", A));
        assert!(!locks.release("doc", 1, "alice", A));
        assert!(locks.release("doc", 0, "alice", A));
        assert!(locks.is_empty());
        // late commit after release is a no-op
        assert!(!locks.release("doc", 0, "alice", A));
    }

    #[test]
    fn lock_then_release_is_a_no_op_overall() {
        let mut locks = table();
        locks.acquire("doc", 3, "alice", A, now());
        locks.release("doc", 3, "alice", A);
        assert_eq!(locks.acquire("doc", 3, "bob", B, now()), Acquire::Granted);
    }

    #[test]
    fn session_teardown_frees_everything_it_held() {
        let mut locks = table();
        locks.acquire("doc", 0, "alice", A, now());
        locks.acquire("doc", 1, "alice", A, now());
        locks.acquire("other", 0, "bob", B, now());
        let mut freed = locks.release_session(A);
        freed.sort();
        assert_eq!(freed, vec![("doc".to_string(), 0), ("doc".to_string(), 1)]);
        assert_eq!(locks.len(), 1);
        assert_eq!(locks.acquire("doc", 0, "bob", B, now()), Acquire::Granted);
    }

    #[test]
    fn file_deletion_drops_its_locks() {
        let mut locks = table();
        locks.acquire("doc", 0, "alice", A, now());
        locks.acquire("doc", 7, "bob", B, now());
        locks.acquire("other", 0, "bob", B, now());
        assert_eq!(locks.release_file("doc"), 2);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn table_full() {
        let mut locks = LockTable::new(1);
        assert_eq!(locks.acquire("a", 0, "alice", A, now()), Acquire::Granted);
        assert_eq!(locks.acquire("b", 0, "alice", A, now()), Acquire::TableFull);
    }
}
