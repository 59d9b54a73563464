//! Observable binding interface for UI layers.
//!
//! UI code never touches the model internals; it holds a `Preference<T>`
//! (or any `ObservablePreference<T>`) and either subscribes to changes or
//! keeps a `PreferenceState<T>`, a live view that is updated by push.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::entry::Preference;
use crate::value::PrefValue;


/// Callback invoked with each new value.
pub type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;


/// Observer registry owned by one entry.
pub(crate) struct ObserverList<T> {
    next_id: AtomicU64,
    slots: Mutex<Vec<(u64, Observer<T>)>>,
}

impl<T> ObserverList<T> {
    pub(crate) fn new() -> Self {
        ObserverList {
            next_id: AtomicU64::new(1),
            slots: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, observer: Observer<T>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().push((id, observer));
        id
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Call every observer registered at the time of the call. The list
    /// lock is released first so observers may subscribe, unsubscribe or
    /// write preferences themselves.
    pub(crate) fn notify(&self, value: &T) {
        let current: Vec<Observer<T>> = self
            .slots
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in current {
            observer(value);
        }
    }
}


trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T: Send + Sync> Detach for ObserverList<T> {
    fn detach(&self, id: u64) {
        self.slots.lock().retain(|(slot, _)| *slot != id);
    }
}


/// Registration of one observer on one entry.
///
/// Dropping the subscription unsubscribes. `unsubscribe` may be called any
/// number of times, including after the entry itself is gone.
#[must_use = "dropping a Subscription unsubscribes the observer"]
pub struct Subscription {
    id: u64,
    target: Mutex<Option<Weak<dyn Detach>>>,
}

impl Subscription {
    pub(crate) fn new<T: Send + Sync + 'static>(id: u64, list: &Arc<ObserverList<T>>) -> Self {
        let list: Arc<dyn Detach> = Arc::clone(list) as Arc<dyn Detach>;
        Subscription {
            id,
            target: Mutex::new(Some(Arc::downgrade(&list))),
        }
    }

    pub fn unsubscribe(&self) {
        let target = self.target.lock().take();
        if let Some(list) = target.and_then(|weak| weak.upgrade()) {
            list.detach(self.id);
        }
    }

    /// True until `unsubscribe` is called or the entry is dropped.
    pub fn is_active(&self) -> bool {
        self.target
            .lock()
            .as_ref()
            .map_or(false, |weak| weak.strong_count() > 0)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}


/// Contract consumed by UI components: read, write back, subscribe.
pub trait ObservablePreference<T>: Send + Sync {
    fn current(&self) -> T;
    fn request_write(&self, value: T);
    fn subscribe(&self, observer: Observer<T>) -> Subscription;
}

impl<T: PrefValue> ObservablePreference<T> for Preference<T> {
    fn current(&self) -> T {
        self.get()
    }

    fn request_write(&self, value: T) {
        self.set(value)
    }

    fn subscribe(&self, observer: Observer<T>) -> Subscription {
        self.subscribe_observer(observer)
    }
}


/// Live, push-updated view of one entry.
///
/// `version` increases on every observed change, so a render loop can
/// cheaply tell whether it needs to redraw. `value` reads through to the
/// entry, so concurrent writers cannot leave the view behind it.
pub struct PreferenceState<T: PrefValue> {
    preference: Preference<T>,
    version: Arc<AtomicU64>,
    _subscription: Subscription,
}

impl<T: PrefValue> PreferenceState<T> {
    pub fn value(&self) -> T {
        self.preference.get()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn changed_since(&self, version: u64) -> bool {
        self.version() != version
    }

    /// Write back through the entry (validation and persistence included).
    pub fn set(&self, value: T) {
        self.preference.set(value)
    }

    pub fn preference(&self) -> &Preference<T> {
        &self.preference
    }
}

impl<T: PrefValue> Preference<T> {
    /// Bind a live view to this entry.
    pub fn state(&self) -> PreferenceState<T> {
        let version = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&version);
        let subscription = self.observe(move |_: &T| {
            counter.fetch_add(1, Ordering::AcqRel);
        });
        PreferenceState {
            preference: self.clone(),
            version,
            _subscription: subscription,
        }
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
