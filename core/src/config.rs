//! Datastore configuration.
//!
//! The host passes one `DatastoreConfig` to `Datastore::init` at startup.
//! It is serde-friendly so hosts can keep it in their own config files; every
//! field has a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};


/// Name of the directory created under the storage root.
pub const DATASTORE_DIR_NAME: &str = "jetpref_datastore";

/// Extension of every backing file.
pub const FILE_EXTENSION: &str = "jetpref";

/// Debounce window applied when the host does not override it.
pub const DEFAULT_SAVE_INTERVAL_MS: u64 = 5_000;


#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatastoreConfig {
    /// The application's private storage root. Backing files live in
    /// `<storage_root>/jetpref_datastore/`.
    pub storage_root: PathBuf,
    /// Quiet period after the last write before a model is flushed.
    pub save_interval_ms: u64,
}

impl DatastoreConfig {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        DatastoreConfig {
            storage_root: storage_root.into(),
            save_interval_ms: DEFAULT_SAVE_INTERVAL_MS,
        }
    }

    /// Override the debounce window.
    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.save_interval_ms)
    }

    /// Directory holding one backing file per model.
    pub fn datastore_dir(&self) -> PathBuf {
        datastore_dir(&self.storage_root)
    }
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        DatastoreConfig::new(".")
    }
}


pub fn datastore_dir(storage_root: &Path) -> PathBuf {
    storage_root.join(DATASTORE_DIR_NAME)
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
