//! The persistent file catalog.
//!
//! One SQLite database holds everything the coordinator must remember
//! across restarts: file entries, access grants, access requests, and
//! checkpoint rows. The lock table and the node registry are deliberately
//! not here; they are session- and process-scoped.

use std::path::Path;

use quill_msg::AccessMask;
use rusqlite::{params, Connection, OptionalExtension};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    filename TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    primary_node INTEGER NOT NULL,
    replica_node INTEGER,
    word_count INTEGER NOT NULL DEFAULT 0,
    char_count INTEGER NOT NULL DEFAULT 0,
    sentence_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    modified_at INTEGER NOT NULL,
    accessed_at INTEGER NOT NULL,
    is_folder INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS access_control (
    filename TEXT NOT NULL,
    username TEXT NOT NULL,
    permissions INTEGER NOT NULL,
    PRIMARY KEY (filename, username)
);

CREATE TABLE IF NOT EXISTS access_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    requester TEXT NOT NULL,
    access_type INTEGER NOT NULL,
    requested_at INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
);

CREATE TABLE IF NOT EXISTS checkpoints (
    filename TEXT NOT NULL,
    tag TEXT NOT NULL,
    locator TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (filename, tag)
);

CREATE TABLE IF NOT EXISTS undo_history (
    filename TEXT PRIMARY KEY,
    content TEXT,
    username TEXT,
    timestamp INTEGER
);
";

/// One catalog row of the `files` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub owner: String,
    pub primary_node: u32,
    pub replica_node: Option<u32>,
    pub is_folder: bool,
    pub word_count: u32,
    pub char_count: u32,
    pub sentence_count: u32,
    pub created_at: i64,
    pub modified_at: i64,
    pub accessed_at: i64,
}

/// Subset of columns used by VIEW listings.
#[derive(Clone, Debug)]
pub struct FileListing {
    pub name: String,
    pub owner: String,
    pub is_folder: bool,
    pub word_count: u32,
    pub sentence_count: u32,
    pub created_at: i64,
}

/// One pending access request, joined with file ownership.
#[derive(Clone, Debug)]
pub struct PendingRequest {
    pub file: String,
    pub requester: String,
    pub access_type: u8,
    pub requested_at: i64,
}

pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Opens (creating if needed) the catalog at `path`.
    pub fn open(path: &Path) -> crate::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// A fresh in-memory catalog, mainly for tests.
    pub fn open_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn exists(&self, name: &str) -> crate::Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM files WHERE filename = ?1;",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get(&self, name: &str) -> crate::Result<Option<FileEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT filename, owner, primary_node, replica_node, is_folder, \
                 word_count, char_count, sentence_count, created_at, modified_at, accessed_at \
                 FROM files WHERE filename = ?1;",
                params![name],
                |row| {
                    Ok(FileEntry {
                        name: row.get(0)?,
                        owner: row.get(1)?,
                        primary_node: row.get(2)?,
                        replica_node: row.get(3)?,
                        is_folder: row.get::<_, i64>(4)? != 0,
                        word_count: row.get(5)?,
                        char_count: row.get(6)?,
                        sentence_count: row.get(7)?,
                        created_at: row.get(8)?,
                        modified_at: row.get(9)?,
                        accessed_at: row.get(10)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    pub fn insert_file(
        &self,
        name: &str,
        owner: &str,
        primary_node: u32,
        replica_node: Option<u32>,
        is_folder: bool,
        now: i64,
    ) -> crate::Result<()> {
        self.conn.execute(
            "INSERT INTO files (filename, owner, primary_node, replica_node, is_folder, \
             created_at, modified_at, accessed_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?6);",
            params![name, owner, primary_node, replica_node, is_folder as i64, now],
        )?;
        Ok(())
    }

    /// Removes the file and everything hanging off it: grants, requests,
    /// and checkpoint rows.
    pub fn remove_file(&mut self, name: &str) -> crate::Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM files WHERE filename = ?1;", params![name])?;
        tx.execute(
            "DELETE FROM access_control WHERE filename = ?1;",
            params![name],
        )?;
        tx.execute(
            "DELETE FROM access_requests WHERE filename = ?1;",
            params![name],
        )?;
        tx.execute(
            "DELETE FROM checkpoints WHERE filename = ?1;",
            params![name],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn touch_accessed(&self, name: &str, now: i64) -> crate::Result<()> {
        self.conn.execute(
            "UPDATE files SET accessed_at = ?1 WHERE filename = ?2;",
            params![now, name],
        )?;
        Ok(())
    }

    pub fn touch_modified(&self, name: &str, now: i64) -> crate::Result<()> {
        self.conn.execute(
            "UPDATE files SET modified_at = ?1 WHERE filename = ?2;",
            params![now, name],
        )?;
        Ok(())
    }

    /// Upserts an access grant.
    pub fn grant(&self, name: &str, user: &str, permissions: u8) -> crate::Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO access_control (filename, username, permissions) \
             VALUES (?1, ?2, ?3);",
            params![name, user, permissions],
        )?;
        Ok(())
    }

    pub fn revoke(&self, name: &str, user: &str) -> crate::Result<()> {
        self.conn.execute(
            "DELETE FROM access_control WHERE filename = ?1 AND username = ?2;",
            params![name, user],
        )?;
        Ok(())
    }

    pub fn granted_mask(&self, name: &str, user: &str) -> crate::Result<Option<u8>> {
        let mask: Option<u8> = self
            .conn
            .query_row(
                "SELECT permissions FROM access_control WHERE filename = ?1 AND username = ?2;",
                params![name, user],
                |row| row.get(0),
            )
            .optional()?;
        Ok(mask)
    }

    /// Owner has everything implicitly; anyone else needs a grant covering
    /// all the `required` bits.
    pub fn has_permission(
        &self,
        name: &str,
        user: &str,
        required: AccessMask,
    ) -> crate::Result<bool> {
        if let Some(owner) = self.owner_of(name)? {
            if owner == user {
                return Ok(true);
            }
        }
        match self.granted_mask(name, user)? {
            Some(bits) => Ok(AccessMask::from_bits(bits)
                .map(|mask| mask.satisfies(required))
                .unwrap_or(false)),
            None => Ok(false),
        }
    }

    pub fn owner_of(&self, name: &str) -> crate::Result<Option<String>> {
        let owner = self
            .conn
            .query_row(
                "SELECT owner FROM files WHERE filename = ?1;",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    /// Files visible to `user`: theirs plus those they are granted, or the
    /// whole catalog when `all` is set.
    pub fn list(&self, user: &str, all: bool) -> crate::Result<Vec<FileListing>> {
        let map = |row: &rusqlite::Row<'_>| {
            Ok(FileListing {
                name: row.get(0)?,
                owner: row.get(1)?,
                is_folder: row.get::<_, i64>(2)? != 0,
                word_count: row.get(3)?,
                sentence_count: row.get(4)?,
                created_at: row.get(5)?,
            })
        };
        let mut out = Vec::new();
        if all {
            let mut stmt = self.conn.prepare(
                "SELECT filename, owner, is_folder, word_count, sentence_count, created_at \
                 FROM files ORDER BY filename;",
            )?;
            for row in stmt.query_map([], map)? {
                out.push(row?);
            }
        } else {
            let mut stmt = self.conn.prepare(
                "SELECT DISTINCT f.filename, f.owner, f.is_folder, f.word_count, \
                 f.sentence_count, f.created_at \
                 FROM files f LEFT JOIN access_control ac ON f.filename = ac.filename \
                 WHERE f.owner = ?1 OR ac.username = ?1 ORDER BY f.filename;",
            )?;
            for row in stmt.query_map(params![user], map)? {
                out.push(row?);
            }
        }
        Ok(out)
    }

    pub fn insert_request(
        &self,
        name: &str,
        requester: &str,
        access_type: u8,
        now: i64,
    ) -> crate::Result<()> {
        self.conn.execute(
            "INSERT INTO access_requests (filename, requester, access_type, requested_at) \
             VALUES (?1, ?2, ?3, ?4);",
            params![name, requester, access_type, now],
        )?;
        Ok(())
    }

    /// Pending requests against files owned by `owner`.
    pub fn pending_requests(&self, owner: &str) -> crate::Result<Vec<PendingRequest>> {
        let mut stmt = self.conn.prepare(
            "SELECT ar.filename, ar.requester, ar.access_type, ar.requested_at \
             FROM access_requests ar JOIN files f ON ar.filename = f.filename \
             WHERE f.owner = ?1 AND ar.status = 'pending' ORDER BY ar.requested_at;",
        )?;
        let mut out = Vec::new();
        for row in stmt.query_map(params![owner], |row| {
            Ok(PendingRequest {
                file: row.get(0)?,
                requester: row.get(1)?,
                access_type: row.get(2)?,
                requested_at: row.get(3)?,
            })
        })? {
            out.push(row?);
        }
        Ok(out)
    }

    /// Flips pending requests to `status`, returning how many changed.
    pub fn resolve_request(
        &self,
        name: &str,
        requester: &str,
        status: &str,
    ) -> crate::Result<usize> {
        let changed = self.conn.execute(
            "UPDATE access_requests SET status = ?1 \
             WHERE filename = ?2 AND requester = ?3 AND status = 'pending';",
            params![status, name, requester],
        )?;
        Ok(changed)
    }

    /// Upserts a checkpoint row; the tag is unique per file.
    pub fn record_checkpoint(
        &self,
        name: &str,
        tag: &str,
        locator: &str,
        now: i64,
    ) -> crate::Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO checkpoints (filename, tag, locator, created_at) \
             VALUES (?1, ?2, ?3, ?4);",
            params![name, tag, locator, now],
        )?;
        Ok(())
    }

    pub fn checkpoint_exists(&self, name: &str, tag: &str) -> crate::Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM checkpoints WHERE filename = ?1 AND tag = ?2;",
                params![name, tag],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn checkpoints_for(&self, name: &str) -> crate::Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT tag FROM checkpoints WHERE filename = ?1 ORDER BY created_at DESC;",
        )?;
        let mut out = Vec::new();
        for row in stmt.query_map(params![name], |row| row.get(0))? {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn grants_for(&self, name: &str) -> crate::Result<Vec<(String, u8)>> {
        let mut stmt = self.conn.prepare(
            "SELECT username, permissions FROM access_control \
             WHERE filename = ?1 ORDER BY username;",
        )?;
        let mut out = Vec::new();
        for row in stmt.query_map(params![name], |row| Ok((row.get(0)?, row.get(1)?)))? {
            out.push(row?);
        }
        Ok(out)
    }

    /// Request rows for a file in any state. Used by invariant checks.
    pub fn request_count(&self, name: &str) -> crate::Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM access_requests WHERE filename = ?1;",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
