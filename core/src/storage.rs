//! Storage backends for backing files.
//!
//! `PrefStorage` is the seam between the persistence worker and the outside
//! world. `FileStorage` is the production backend, `VolatileStorage` is the
//! fallback when the datastore directory is unusable, and `MemoryStorage`
//! is a recording test double.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::config::FILE_EXTENSION;
use crate::error::PrefError;


/// Whole-file storage keyed by model name.
pub trait PrefStorage: Send + Sync {
    /// Read a model's file. `Ok(None)` means no file exists yet.
    fn read(&self, name: &str) -> Result<Option<String>, PrefError>;

    /// Replace a model's file with `contents`.
    fn write(&self, name: &str, contents: &str) -> Result<(), PrefError>;

    /// Where the model's file lives, if it lives anywhere.
    fn location(&self, name: &str) -> Option<PathBuf> {
        let _ = name;
        None
    }

    /// False for backends that drop everything at process exit.
    fn is_durable(&self) -> bool {
        true
    }
}


// ---------------------------------------------------------------------------
// File backend
// ---------------------------------------------------------------------------

/// One `<name>.jetpref` file per model inside a single directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PrefError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| PrefError::StorageUnavailable {
            path: dir.clone(),
            source,
        })?;
        Ok(FileStorage { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf, PrefError> {
        check_name(name)?;
        Ok(self.dir.join(format!("{}.{}", name, FILE_EXTENSION)))
    }
}

impl PrefStorage for FileStorage {
    fn read(&self, name: &str) -> Result<Option<String>, PrefError> {
        let path = self.path_for(name)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PrefError::ReadFailure { path, source }),
        }
    }

    /// Atomic replace: write a temporary sibling, then rename over the
    /// target. The directory is recreated if it vanished mid-session.
    fn write(&self, name: &str, contents: &str) -> Result<(), PrefError> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.dir).map_err(|source| PrefError::WriteFailure {
            path: self.dir.clone(),
            source,
        })?;
        let tmp_path = self.dir.join(format!(".{}.{}.tmp", name, FILE_EXTENSION));
        fs::write(&tmp_path, contents).map_err(|source| PrefError::WriteFailure {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            PrefError::WriteFailure {
                path: path.clone(),
                source,
            }
        })
    }

    fn location(&self, name: &str) -> Option<PathBuf> {
        self.path_for(name).ok()
    }
}


fn check_name(name: &str) -> Result<(), PrefError> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(|c: char| c == '/' || c == '\\' || c == '\0');
    if bad {
        Err(PrefError::InvalidModelName(name.to_string()))
    } else {
        Ok(())
    }
}


// ---------------------------------------------------------------------------
// Volatile backend
// ---------------------------------------------------------------------------

/// Reads nothing, writes nowhere. Preferences live only in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolatileStorage;

impl PrefStorage for VolatileStorage {
    fn read(&self, _name: &str) -> Result<Option<String>, PrefError> {
        Ok(None)
    }

    fn write(&self, _name: &str, _contents: &str) -> Result<(), PrefError> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}


// ---------------------------------------------------------------------------
// Memory backend (test double)
// ---------------------------------------------------------------------------

/// Keeps files in a map and records every write, in order. Model names
/// follow the same rules as `FileStorage`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load a file.
    pub fn with_file(self, name: &str, contents: &str) -> Self {
        self.files.lock().insert(name.to_string(), contents.to_string());
        self
    }

    pub fn contents(&self, name: &str) -> Option<String> {
        self.files.lock().get(name).cloned()
    }

    /// Number of successful writes to `name`.
    pub fn write_count(&self, name: &str) -> usize {
        self.writes.lock().iter().filter(|n| n.as_str() == name).count()
    }

    pub fn total_writes(&self) -> usize {
        self.writes.lock().len()
    }

    /// Every call to `write`, failed ones included.
    pub fn write_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Make subsequent reads fail with `ReadFailure`.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail with `WriteFailure`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl PrefStorage for MemoryStorage {
    fn read(&self, name: &str) -> Result<Option<String>, PrefError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PrefError::ReadFailure {
                path: PathBuf::from(name),
                source: std::io::Error::new(ErrorKind::PermissionDenied, "reads disabled"),
            });
        }
        Ok(self.contents(name))
    }

    fn write(&self, name: &str, contents: &str) -> Result<(), PrefError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        check_name(name)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PrefError::WriteFailure {
                path: PathBuf::from(name),
                source: std::io::Error::new(ErrorKind::Other, "disk full"),
            });
        }
        self.files.lock().insert(name.to_string(), contents.to_string());
        self.writes.lock().push(name.to_string());
        Ok(())
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("jetpref_datastore");
        let storage = FileStorage::open(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(storage.dir(), dir.as_path());
    }

    #[test]
    fn open_fails_when_parent_is_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        fs::write(&blocker, "x").unwrap();
        match FileStorage::open(blocker.join("jetpref_datastore")) {
            Err(PrefError::StorageUnavailable { .. }) => {}
            other => panic!("expected StorageUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_reads_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(tmp.path()).unwrap();
        assert_eq!(storage.read("absent").unwrap(), None);
    }

    #[test]
    fn write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(tmp.path()).unwrap();
        storage.write("app", "volume;75\n").unwrap();
        assert_eq!(storage.read("app").unwrap().as_deref(), Some("volume;75\n"));
        let path = tmp.path().join("app.jetpref");
        assert_eq!(fs::read_to_string(&path).unwrap(), "volume;75\n");
        assert_eq!(storage.location("app"), Some(path));
        // No temporary file left behind.
        assert!(!tmp.path().join(".app.jetpref.tmp").exists());
    }

    #[test]
    fn write_replaces_whole_file() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(tmp.path()).unwrap();
        storage.write("app", "a;1\nb;2\n").unwrap();
        storage.write("app", "a;3\n").unwrap();
        assert_eq!(storage.read("app").unwrap().as_deref(), Some("a;3\n"));
    }

    #[test]
    fn write_recreates_deleted_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("jetpref_datastore");
        let storage = FileStorage::open(&dir).unwrap();
        fs::remove_dir_all(&dir).unwrap();
        storage.write("app", "a;1\n").unwrap();
        assert!(dir.join("app.jetpref").exists());
    }

    #[test]
    fn unreadable_path_is_read_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(tmp.path()).unwrap();
        // A directory where the file should be cannot be read as text.
        fs::create_dir(tmp.path().join("app.jetpref")).unwrap();
        assert!(matches!(storage.read("app"), Err(PrefError::ReadFailure { .. })));
    }

    #[test]
    fn invalid_model_names_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(tmp.path()).unwrap();
        for name in ["", "../escape", ".hidden", "a/b"] {
            assert!(matches!(
                storage.write(name, ""),
                Err(PrefError::InvalidModelName(_))
            ));
        }
        assert_eq!(storage.location("a/b"), None);
    }

    #[test]
    fn volatile_storage_is_a_no_op() {
        let storage = VolatileStorage;
        storage.write("app", "a;1\n").unwrap();
        assert_eq!(storage.read("app").unwrap(), None);
        assert!(!storage.is_durable());
        assert_eq!(storage.location("app"), None);
    }

    #[test]
    fn memory_storage_records_writes() {
        let storage = MemoryStorage::new().with_file("app", "a;1\n");
        assert_eq!(storage.read("app").unwrap().as_deref(), Some("a;1\n"));
        storage.write("app", "a;2\n").unwrap();
        storage.write("other", "").unwrap();
        assert_eq!(storage.write_count("app"), 1);
        assert_eq!(storage.total_writes(), 2);

        storage.fail_writes(true);
        assert!(storage.write("app", "a;3\n").is_err());
        assert_eq!(storage.contents("app").as_deref(), Some("a;2\n"));
        assert!(matches!(
            storage.write("../app", ""),
            Err(PrefError::InvalidModelName(_))
        ));
        assert_eq!(storage.write_attempts(), 4);

        storage.fail_reads(true);
        assert!(storage.read("app").is_err());
    }
}
