//! Persistence manager: debounced background saves.
//!
//! A single worker thread owns all disk writes. Entries talk to it through
//! a `PersistHandle` (an mpsc sender); the worker is the single consumer.
//!
//! # Worker loop
//!
//! 1. Wait for a request, or until the earliest pending deadline
//! 2. Handle the request: register a model, (re)start its debounce window,
//!    flush on demand, or shut down
//! 3. Save every model whose deadline has passed
//!
//! Each save rewrites the model's whole file from memory. Because only the
//! worker writes, at most one save per model is ever in flight.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::codec;
use crate::error::PrefError;
use crate::model::ModelState;
use crate::storage::PrefStorage;


/// Requests handled by the worker.
pub(crate) enum PersistRequest {
    /// Start tracking a loaded model.
    Register(Arc<ModelState>),
    /// A model changed; (re)start its debounce window.
    Schedule(String),
    /// Save now (one model, or all when `None`) and acknowledge.
    Flush {
        name: Option<String>,
        done: mpsc::Sender<()>,
    },
    /// Save everything, acknowledge, and exit.
    Shutdown { done: mpsc::Sender<()> },
}


/// Cloneable sender side of the worker channel.
#[derive(Clone)]
pub(crate) struct PersistHandle {
    sender: mpsc::Sender<PersistRequest>,
}

impl PersistHandle {
    pub(crate) fn schedule(&self, name: &str) {
        // After shutdown the worker is gone; the change stays in memory.
        let _ = self.sender.send(PersistRequest::Schedule(name.to_string()));
    }

    /// Block until the worker has saved `name` (or everything).
    pub(crate) fn flush(&self, name: Option<&str>) {
        let (done, wait) = mpsc::channel();
        let request = PersistRequest::Flush {
            name: name.map(str::to_string),
            done,
        };
        if self.sender.send(request).is_ok() {
            let _ = wait.recv();
        }
    }

    fn register(&self, state: Arc<ModelState>) {
        let _ = self.sender.send(PersistRequest::Register(state));
    }
}


/// Owns the storage backend and the save worker.
pub struct PersistenceManager {
    storage: Arc<dyn PrefStorage>,
    interval: Duration,
    handle: PersistHandle,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PersistenceManager {
    /// Spawn the worker. If the thread cannot be spawned, every save becomes
    /// a no-op and preferences stay in memory.
    pub fn start(storage: Arc<dyn PrefStorage>, interval: Duration) -> Self {
        let (sender, receiver) = mpsc::channel();
        let worker = SaveWorker {
            storage: Arc::clone(&storage),
            interval,
            receiver,
            models: HashMap::new(),
            pending: HashMap::new(),
        };
        let join = thread::Builder::new()
            .name("jetpref-persist".into())
            .spawn(move || worker.run());
        let join = match join {
            Ok(join) => Some(join),
            Err(e) => {
                error!("cannot start persistence worker: {}; preferences will not be saved", e);
                None
            }
        };
        PersistenceManager {
            storage,
            interval,
            handle: PersistHandle { sender },
            worker: Mutex::new(join),
        }
    }

    pub fn storage(&self) -> &Arc<dyn PrefStorage> {
        &self.storage
    }

    pub fn save_interval(&self) -> Duration {
        self.interval
    }

    /// Read a model's records. Never fails: a missing file, a read error or
    /// an invalid name all yield no records, so every entry keeps its
    /// default.
    pub fn load(&self, name: &str) -> Vec<(String, String)> {
        match self.storage.read(name) {
            Ok(Some(text)) => codec::decode_document(&text),
            Ok(None) => {
                debug!(model = name, "no backing file; using defaults");
                Vec::new()
            }
            Err(e) => {
                warn!(model = name, "{}; using defaults", e);
                Vec::new()
            }
        }
    }

    /// Write records immediately on the calling thread.
    pub fn save(&self, name: &str, records: &[(String, String)]) -> Result<(), PrefError> {
        write_records(self.storage.as_ref(), name, records)
    }

    /// Connect a freshly loaded model to the worker. A model that is
    /// already dirty (its file needs correcting) is scheduled right away.
    pub(crate) fn attach(&self, state: &Arc<ModelState>) {
        state.sync().attach(state.name(), self.handle.clone());
        self.handle.register(Arc::clone(state));
        if state.sync().is_dirty() {
            self.handle.schedule(state.name());
        }
    }

    /// Save one model now if it has unsaved changes.
    pub fn flush(&self, name: &str) {
        self.handle.flush(Some(name));
    }

    /// Save every dirty model now.
    pub fn flush_all(&self) {
        self.handle.flush(None);
    }

    /// Save every dirty model and stop the worker. Safe to call repeatedly.
    pub fn shutdown(&self) {
        let join = self.worker.lock().take();
        let Some(join) = join else {
            return;
        };
        let (done, wait) = mpsc::channel();
        if self.handle.sender.send(PersistRequest::Shutdown { done }).is_ok() {
            let _ = wait.recv();
        }
        if join.join().is_err() {
            error!("persistence worker panicked");
        }
    }
}

impl Drop for PersistenceManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}


fn write_records(
    storage: &dyn PrefStorage,
    name: &str,
    records: &[(String, String)],
) -> Result<(), PrefError> {
    let contents = codec::encode_document(records.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    storage.write(name, &contents)
}


// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct SaveWorker {
    storage: Arc<dyn PrefStorage>,
    interval: Duration,
    receiver: mpsc::Receiver<PersistRequest>,
    models: HashMap<String, Arc<ModelState>>,
    /// Debounce deadline per model name.
    pending: HashMap<String, Instant>,
}

impl SaveWorker {
    fn run(mut self) {
        loop {
            let request = match self.next_deadline() {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match self.receiver.recv_timeout(timeout) {
                        Ok(request) => Some(request),
                        Err(mpsc::RecvTimeoutError::Timeout) => None,
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.receiver.recv() {
                    Ok(request) => Some(request),
                    Err(_) => break,
                },
            };

            if let Some(request) = request {
                if self.handle(request) {
                    return;
                }
            }
            self.save_due();
        }
        self.save_all();
    }

    /// Returns true when the worker should exit.
    fn handle(&mut self, request: PersistRequest) -> bool {
        match request {
            PersistRequest::Register(state) => {
                let name = state.name().to_string();
                if let Some(existing) = self.models.get(&name) {
                    if existing.id() != state.id() {
                        warn!(
                            model = %name,
                            first = existing.id(),
                            second = state.id(),
                            "two models share one backing file; last writer wins"
                        );
                    }
                }
                self.models.insert(name, state);
            }
            PersistRequest::Schedule(name) => {
                trace!(model = %name, "debounce window restarted");
                self.pending.insert(name, Instant::now() + self.interval);
            }
            PersistRequest::Flush { name, done } => {
                match name {
                    Some(name) => {
                        self.pending.remove(&name);
                        self.save(&name);
                    }
                    None => self.save_all(),
                }
                let _ = done.send(());
            }
            PersistRequest::Shutdown { done } => {
                self.save_all();
                let _ = done.send(());
                return true;
            }
        }
        false
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    fn save_due(&mut self) {
        let now = Instant::now();
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(name, _)| name.clone())
            .collect();
        for name in due {
            self.pending.remove(&name);
            self.save(&name);
        }
    }

    fn save_all(&mut self) {
        self.pending.clear();
        let names: Vec<String> = self.models.keys().cloned().collect();
        for name in names {
            self.save(&name);
        }
    }

    /// Rewrite one model's file if it is dirty. On failure the model stays
    /// dirty and is retried after another debounce interval, unless its name
    /// can never be stored; then the worker stops tracking it.
    fn save(&mut self, name: &str) {
        let Some(state) = self.models.get(name).cloned() else {
            return;
        };
        if !state.sync().take_dirty() {
            return;
        }
        let records = state.snapshot();
        match write_records(self.storage.as_ref(), name, &records) {
            Ok(()) => debug!(model = name, records = records.len(), "saved"),
            Err(e @ PrefError::InvalidModelName(_)) => {
                error!(model = name, "{}; changes to this model stay in memory", e);
                state.sync().restore_dirty();
                self.models.remove(name);
            }
            Err(e) => {
                warn!(model = name, "{}; will retry", e);
                // Re-flag without re-scheduling through the channel.
                state.sync().restore_dirty();
                self.pending.insert(name.to_string(), Instant::now() + self.interval);
            }
        }
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
