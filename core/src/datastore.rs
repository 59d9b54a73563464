//! Datastore: the host-facing entry point.
//!
//! The host builds one `Datastore` at startup from a `DatastoreConfig` and
//! passes it to whoever needs preferences. Models are requested by explicit
//! identity; the first request constructs and loads the model, later
//! requests return the same instance.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::cache::{ModelCache, ModelId};
use crate::config::DatastoreConfig;
use crate::group::ModelBuilder;
use crate::model::{CachedModel, ModelHandle, ModelState};
use crate::persist::PersistenceManager;
use crate::storage::{FileStorage, PrefStorage, VolatileStorage};


pub struct Datastore {
    config: DatastoreConfig,
    cache: ModelCache,
    persistence: PersistenceManager,
}

impl Datastore {
    /// Open the datastore directory under the configured storage root.
    ///
    /// If the directory cannot be created the datastore still works, but
    /// only in memory for the rest of the process.
    pub fn init(config: DatastoreConfig) -> Self {
        let dir = config.datastore_dir();
        let storage: Arc<dyn PrefStorage> = match FileStorage::open(&dir) {
            Ok(storage) => {
                info!(dir = %dir.display(), "datastore ready");
                Arc::new(storage)
            }
            Err(e) => {
                error!("{}; preferences will not persist this session", e);
                Arc::new(VolatileStorage)
            }
        };
        Self::with_storage(config, storage)
    }

    /// Use a caller-supplied backend (tests, custom hosts).
    pub fn with_storage(config: DatastoreConfig, storage: Arc<dyn PrefStorage>) -> Self {
        let persistence = PersistenceManager::start(storage, config.save_interval());
        Datastore {
            config,
            cache: ModelCache::new(),
            persistence,
        }
    }

    pub fn config(&self) -> &DatastoreConfig {
        &self.config
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// False when running on the volatile fallback.
    pub fn is_durable(&self) -> bool {
        self.persistence.storage().is_durable()
    }

    /// Path of a model's backing file, if storage is file-backed.
    pub fn backing_path(&self, name: &str) -> Option<PathBuf> {
        self.persistence.storage().location(name)
    }

    /// Return the model cached under `id`, constructing and loading it on
    /// first use. `factory` runs at most once per identity.
    ///
    /// The first request reads the backing file on the calling thread, so it
    /// returns a fully loaded model; concurrent first requests for the same
    /// identity wait for that read. Hosts that must not block on first use
    /// call `preload` from a background thread at startup. Later requests
    /// never touch the disk.
    ///
    /// Requesting an identity with a different model type than the cached
    /// one is a programming error: it is logged and the caller gets a fresh
    /// in-memory instance that is never saved.
    pub fn get_or_create<M, F>(&self, id: impl Into<ModelId>, factory: F) -> ModelHandle<M>
    where
        M: Send + Sync + 'static,
        F: FnOnce(&mut ModelBuilder) -> M,
    {
        let id = id.into();
        let cached = self
            .cache
            .get_or_construct(&id, factory, |factory| self.construct(&id, factory));
        match cached {
            Ok(inner) => ModelHandle::new(inner),
            Err(factory) => {
                error!(model = %id, "identity already cached with a different model type");
                let mut builder = ModelBuilder::new(id.as_str());
                let model = factory(&mut builder);
                let state = Arc::new(builder.finish());
                ModelHandle::new(Arc::new(CachedModel { model, state }))
            }
        }
    }

    /// Construct and load a model ahead of its first use.
    pub fn preload<M, F>(&self, id: impl Into<ModelId>, factory: F)
    where
        M: Send + Sync + 'static,
        F: FnOnce(&mut ModelBuilder) -> M,
    {
        let _ = self.get_or_create(id, factory);
    }

    /// Write one model now if it has unsaved changes, by file name.
    pub fn flush(&self, name: &str) {
        self.persistence.flush(name)
    }

    /// Write every dirty model now and wait for completion.
    pub fn flush_all(&self) {
        self.persistence.flush_all()
    }

    /// Flush and stop the persistence worker. Later writes stay in memory.
    pub fn shutdown(&self) {
        self.persistence.shutdown()
    }

    fn construct<M, F>(&self, id: &ModelId, factory: F) -> Arc<CachedModel<M>>
    where
        F: FnOnce(&mut ModelBuilder) -> M,
    {
        let mut builder = ModelBuilder::new(id.as_str());
        let model = factory(&mut builder);
        let state: Arc<ModelState> = Arc::new(builder.finish());
        let records = self.persistence.load(state.name());
        if state.apply_records(records) {
            state.sync().mark_dirty();
        }
        self.persistence.attach(&state);
        Arc::new(CachedModel { model, state })
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
