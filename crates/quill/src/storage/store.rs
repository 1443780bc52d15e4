//! On-disk content store of a storage node.
//!
//! Layout under the data directory: `files/` holds current content,
//! `undo/` one snapshot per file, `checkpoints/` blob files keyed by
//! `<file>.<tag>`. Names and tags are validated at the protocol boundary,
//! so they are safe to use as path components here.

use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

use quill_msg::text;

/// Storage-side counters for INFO.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub words: usize,
    pub chars: usize,
    pub sentences: usize,
    pub modified: SystemTime,
}

/// Outcome of an undo attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UndoOutcome {
    Done,
    NoHistory,
    NoFile,
}

/// Outcome of a checkpoint revert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevertOutcome {
    Done,
    NoCheckpoint,
}

pub struct NodeStore {
    root: PathBuf,
}

impl NodeStore {
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("files"))?;
        std::fs::create_dir_all(root.join("undo"))?;
        std::fs::create_dir_all(root.join("checkpoints"))?;
        Ok(Self { root })
    }

    /// Checkpoint blob key for a file and tag.
    pub fn locator(name: &str, tag: &str) -> String {
        format!("{name}.{tag}")
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.root.join("files").join(name)
    }

    fn undo_path(&self, name: &str) -> PathBuf {
        self.root.join("undo").join(name)
    }

    fn checkpoint_path(&self, locator: &str) -> PathBuf {
        self.root.join("checkpoints").join(locator)
    }

    /// Creates an empty file; `false` when it already exists.
    pub fn create(&self, name: &str) -> io::Result<bool> {
        let path = self.file_path(name);
        if path.exists() {
            return Ok(false);
        }
        std::fs::write(path, "")?;
        Ok(true)
    }

    pub fn load(&self, name: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.file_path(name)) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Replaces content, optionally snapshotting the previous content as
    /// the file's undo state first.
    pub fn save(&self, name: &str, content: &str, snapshot_undo: bool) -> io::Result<()> {
        if snapshot_undo {
            if let Some(current) = self.load(name)? {
                std::fs::write(self.undo_path(name), current)?;
            }
        }
        std::fs::write(self.file_path(name), content)
    }

    /// Removes content, undo state, and checkpoint blobs. `false` when the
    /// file did not exist.
    pub fn remove(&self, name: &str) -> io::Result<bool> {
        match std::fs::remove_file(self.file_path(name)) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        }
        let _ = std::fs::remove_file(self.undo_path(name));
        for (tag, _) in self.checkpoint_list(name)? {
            let _ = std::fs::remove_file(self.checkpoint_path(&Self::locator(name, &tag)));
        }
        Ok(true)
    }

    /// Swaps current content with the undo snapshot, so a second undo
    /// brings the first edit back.
    pub fn undo(&self, name: &str) -> io::Result<UndoOutcome> {
        let snapshot = match std::fs::read_to_string(self.undo_path(name)) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(UndoOutcome::NoHistory),
            Err(err) => return Err(err),
        };
        let Some(current) = self.load(name)? else {
            return Ok(UndoOutcome::NoFile);
        };
        std::fs::write(self.undo_path(name), current)?;
        std::fs::write(self.file_path(name), snapshot)?;
        Ok(UndoOutcome::Done)
    }

    pub fn info(&self, name: &str) -> io::Result<Option<FileInfo>> {
        let Some(content) = self.load(name)? else {
            return Ok(None);
        };
        let modified = std::fs::metadata(self.file_path(name))?.modified()?;
        let (words, chars, sentences) = text::counters(&content);
        Ok(Some(FileInfo {
            words,
            chars,
            sentences,
            modified,
        }))
    }

    /// Snapshots current content under `tag`; `false` when the file is
    /// missing. An existing tag is overwritten, matching the catalog's
    /// tag-unique-per-file rule.
    pub fn checkpoint_create(&self, name: &str, tag: &str) -> io::Result<bool> {
        let Some(content) = self.load(name)? else {
            return Ok(false);
        };
        std::fs::write(self.checkpoint_path(&Self::locator(name, tag)), content)?;
        Ok(true)
    }

    /// Tags checkpointed for `name`, most recent first.
    pub fn checkpoint_list(&self, name: &str) -> io::Result<Vec<(String, SystemTime)>> {
        let prefix = format!("{name}.");
        let mut out = Vec::new();
        for entry in std::fs::read_dir(self.root.join("checkpoints"))? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(tag) = file_name.strip_prefix(&prefix) {
                let modified = entry.metadata()?.modified()?;
                out.push((tag.to_string(), modified));
            }
        }
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(out)
    }

    /// Restores the blob under `tag`, snapshotting current content as undo
    /// state first.
    pub fn checkpoint_revert(&self, name: &str, tag: &str) -> io::Result<RevertOutcome> {
        let blob = match std::fs::read_to_string(self.checkpoint_path(&Self::locator(name, tag))) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(RevertOutcome::NoCheckpoint)
            }
            Err(err) => return Err(err),
        };
        self.save(name, &blob, true)?;
        Ok(RevertOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, NodeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = NodeStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn create_load_save() {
        let (_dir, store) = store();
        assert!(store.create("doc").unwrap());
        assert!(!store.create("doc").unwrap());
        assert_eq!(store.load("doc").unwrap().as_deref(), Some(""));
        assert_eq!(store.load("missing").unwrap(), None);

        store.save("doc", "Hello there.", true).unwrap();
        assert_eq!(store.load("doc").unwrap().as_deref(), Some("Hello there."));
    }

    #[test]
    fn undo_swaps_with_the_snapshot() {
        let (_dir, store) = store();
        store.create("doc").unwrap();
        assert_eq!(store.undo("doc").unwrap(), UndoOutcome::NoHistory);

        store.save("doc", "first.", true).unwrap();
        store.save("doc", "second.", true).unwrap();
        assert_eq!(store.undo("doc").unwrap(), UndoOutcome::Done);
        assert_eq!(store.load("doc").unwrap().as_deref(), Some("first."));
        assert_eq!(store.undo("doc").unwrap(), UndoOutcome::Done);
        assert_eq!(store.load("doc").unwrap().as_deref(), Some("second."));
    }

    #[test]
    fn info_counts_content() {
        let (_dir, store) = store();
        store.save("doc", "Hi there. Bye!", false).unwrap();
        let info = store.info("doc").unwrap().unwrap();
        assert_eq!(info.words, 3);
        assert_eq!(info.chars, 14);
        assert_eq!(info.sentences, 2);
        assert!(store.info("missing").unwrap().is_none());
    }

    #[test]
    fn checkpoints_round_trip() {
        let (_dir, store) = store();
        store.save("doc", "v1 content.", false).unwrap();
        assert!(store.checkpoint_create("doc", "v1").unwrap());
        store.save("doc", "v2 content.", false).unwrap();

        let tags: Vec<_> = store
            .checkpoint_list("doc")
            .unwrap()
            .into_iter()
            .map(|(tag, _)| tag)
            .collect();
        assert_eq!(tags, vec!["v1"]);

        assert_eq!(
            store.checkpoint_revert("doc", "v1").unwrap(),
            RevertOutcome::Done
        );
        assert_eq!(store.load("doc").unwrap().as_deref(), Some("v1 content."));
        // the revert snapshotted the pre-revert content
        assert_eq!(store.undo("doc").unwrap(), UndoOutcome::Done);
        assert_eq!(store.load("doc").unwrap().as_deref(), Some("v2 content."));

        assert_eq!(
            store.checkpoint_revert("doc", "nope").unwrap(),
            RevertOutcome::NoCheckpoint
        );
        assert!(!store.checkpoint_create("missing", "v1").unwrap());
    }

    #[test]
    fn remove_drops_undo_and_checkpoints() {
        let (_dir, store) = store();
        store.save("doc", "content.", false).unwrap();
        store.save("doc", "newer.", true).unwrap();
        store.checkpoint_create("doc", "v1").unwrap();

        assert!(store.remove("doc").unwrap());
        assert!(store.load("doc").unwrap().is_none());
        assert_eq!(store.undo("doc").unwrap(), UndoOutcome::NoHistory);
        assert!(store.checkpoint_list("doc").unwrap().is_empty());
        assert!(!store.remove("doc").unwrap());
    }

    #[test]
    fn similar_names_do_not_share_checkpoints() {
        let (_dir, store) = store();
        store.save("a", "one.", false).unwrap();
        store.save("ab", "two.", false).unwrap();
        store.checkpoint_create("a", "v1").unwrap();
        store.checkpoint_create("ab", "v1").unwrap();
        assert_eq!(store.checkpoint_list("a").unwrap().len(), 1);
        assert_eq!(store.checkpoint_list("ab").unwrap().len(), 1);
    }
}
