//! Preference models.
//!
//! `ModelState` is the type-erased side of a model: its layout, dirty flag,
//! and the records of the backing file that no entry claims. The host's own
//! model struct (a plain struct of `Preference<T>` fields) is reached through
//! `ModelHandle<M>`, which derefs to it.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::codec::DELIMITER;
use crate::entry::ErasedPreference;
use crate::error::PrefError;
use crate::group::PreferenceGroup;
use crate::persist::PersistHandle;
use crate::value::PrefKind;


// ---------------------------------------------------------------------------
// Dirty tracking
// ---------------------------------------------------------------------------

/// Dirty flag shared by every entry of one model, plus the link to the
/// persistence worker once the model has been attached.
pub(crate) struct ModelSync {
    dirty: AtomicBool,
    link: Mutex<Option<SaveLink>>,
}

#[derive(Clone)]
struct SaveLink {
    name: String,
    handle: PersistHandle,
}

impl ModelSync {
    pub(crate) fn new() -> Self {
        ModelSync {
            dirty: AtomicBool::new(false),
            link: Mutex::new(None),
        }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Flag unsaved changes and (re)start the debounce window.
    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
        if let Some(link) = self.link.lock().as_ref() {
            link.handle.schedule(&link.name);
        }
    }

    /// Clear the flag, returning whether it was set.
    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Re-flag after a failed save; the caller handles rescheduling.
    pub(crate) fn restore_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn attach(&self, name: &str, handle: PersistHandle) {
        *self.link.lock() = Some(SaveLink {
            name: name.to_string(),
            handle,
        });
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.link.lock().is_some()
    }

    /// Write now if dirty and wait for the worker to finish.
    pub(crate) fn flush(&self) {
        let link = self.link.lock().clone();
        if let Some(link) = link {
            link.handle.flush(Some(&link.name));
        }
    }
}


// ---------------------------------------------------------------------------
// Model state
// ---------------------------------------------------------------------------

/// One row of `ModelHandle::entries`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub key: String,
    pub kind: PrefKind,
    pub value: String,
    pub default: String,
    /// Allowed values for enumerated entries; empty otherwise.
    pub choices: Vec<String>,
}


pub(crate) struct ModelState {
    id: String,
    name: String,
    layout: PreferenceGroup,
    /// Persisted entries in declaration order.
    entries: Vec<Arc<dyn ErasedPreference>>,
    index: HashMap<String, usize>,
    /// Records from the backing file that no entry declares, written back
    /// unchanged on every save.
    retained: Mutex<Vec<(String, String)>>,
    sync: Arc<ModelSync>,
}

impl ModelState {
    pub(crate) fn new(
        id: String,
        name: String,
        layout: PreferenceGroup,
        sync: Arc<ModelSync>,
    ) -> Self {
        let mut entries = Vec::new();
        let mut index = HashMap::new();
        for entry in layout.entries() {
            let key = entry.key().to_string();
            if let Err(reason) = check_key(&key) {
                error!(model = %id, key = %key, "{}; entry will not be persisted", reason);
                continue;
            }
            if index.contains_key(&key) {
                error!(model = %id, key = %key, "duplicate key; entry will not be persisted");
                continue;
            }
            index.insert(key, entries.len());
            entries.push(entry);
        }
        ModelState {
            id,
            name,
            layout,
            entries,
            index,
            retained: Mutex::new(Vec::new()),
            sync,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn layout(&self) -> &PreferenceGroup {
        &self.layout
    }

    pub(crate) fn sync(&self) -> &ModelSync {
        &self.sync
    }

    /// Apply records read from storage. Returns true when the file needs a
    /// rewrite because some stored value was unusable or adjusted.
    pub(crate) fn apply_records(&self, records: Vec<(String, String)>) -> bool {
        let mut rewrite = false;
        let mut retained = Vec::new();
        for (key, raw) in records {
            match self.index.get(&key) {
                Some(&i) => rewrite |= self.entries[i].load_raw(&raw),
                None => {
                    debug!(model = %self.name, key = %key, "retaining unknown key");
                    retained.push((key, raw));
                }
            }
        }
        *self.retained.lock() = retained;
        rewrite
    }

    /// Full snapshot of the current in-memory state, in file order.
    pub(crate) fn snapshot(&self) -> Vec<(String, String)> {
        let mut records: Vec<(String, String)> = self
            .entries
            .iter()
            .map(|e| (e.key().to_string(), e.raw_value()))
            .collect();
        records.extend(self.retained.lock().iter().cloned());
        records
    }

    pub(crate) fn entry_info(&self) -> Vec<EntryInfo> {
        self.entries
            .iter()
            .map(|e| EntryInfo {
                key: e.key().to_string(),
                kind: e.kind(),
                value: e.raw_value(),
                default: e.raw_default(),
                choices: e.choices().iter().map(|c| c.to_string()).collect(),
            })
            .collect()
    }

    pub(crate) fn get_raw(&self, key: &str) -> Option<String> {
        self.index.get(key).map(|&i| self.entries[i].raw_value())
    }

    pub(crate) fn set_raw(&self, key: &str, raw: &str) -> Result<(), PrefError> {
        match self.index.get(key) {
            Some(&i) => self.entries[i].set_raw(raw),
            None => Err(PrefError::UnknownKey(key.to_string())),
        }
    }

    pub(crate) fn reset(&self, key: &str) -> Result<(), PrefError> {
        match self.index.get(key) {
            Some(&i) => {
                self.entries[i].reset();
                Ok(())
            }
            None => Err(PrefError::UnknownKey(key.to_string())),
        }
    }

    pub(crate) fn reset_all(&self) {
        for entry in &self.entries {
            entry.reset();
        }
    }
}


fn check_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("empty key".to_string());
    }
    if key.contains(DELIMITER) || key.contains('\n') || key.contains('\r') {
        return Err(format!("key contains '{}' or a line break", DELIMITER));
    }
    Ok(())
}


// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

pub(crate) struct CachedModel<M> {
    pub(crate) model: M,
    pub(crate) state: Arc<ModelState>,
}


/// Shared handle to a cached model. Derefs to the host's model struct.
pub struct ModelHandle<M> {
    inner: Arc<CachedModel<M>>,
}

impl<M> Clone for ModelHandle<M> {
    fn clone(&self) -> Self {
        ModelHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> Deref for ModelHandle<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.inner.model
    }
}

impl<M> ModelHandle<M> {
    pub(crate) fn new(inner: Arc<CachedModel<M>>) -> Self {
        ModelHandle { inner }
    }

    pub fn id(&self) -> &str {
        self.inner.state.id()
    }

    /// Backing file name, without extension.
    pub fn name(&self) -> &str {
        self.inner.state.name()
    }

    pub fn layout(&self) -> &PreferenceGroup {
        self.inner.state.layout()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state.sync().is_dirty()
    }

    /// True when the model is connected to the persistence worker. Models
    /// handed out after a cache type mismatch are not.
    pub fn is_persistent(&self) -> bool {
        self.inner.state.sync().is_attached()
    }

    /// Write pending changes now instead of waiting for the debounce window.
    pub fn flush_now(&self) {
        self.inner.state.sync().flush()
    }

    pub fn entries(&self) -> Vec<EntryInfo> {
        self.inner.state.entry_info()
    }

    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.inner.state.get_raw(key)
    }

    /// Parse and write a value by key, for hosts that only know keys.
    pub fn set_raw(&self, key: &str, raw: &str) -> Result<(), PrefError> {
        self.inner.state.set_raw(key, raw)
    }

    pub fn reset(&self, key: &str) -> Result<(), PrefError> {
        self.inner.state.reset(key)
    }

    pub fn reset_all(&self) {
        self.inner.state.reset_all()
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
