//! Model cache: one instance per identity.
//!
//! The registry lock only guards the identity → slot map. Construction runs
//! under the slot's own init lock, outside the registry lock, so a slow load
//! of one model never blocks lookups of another while the factory still runs
//! at most once per identity. Lookups of a constructed model take no slot
//! lock at all.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;


/// Explicit cache key of a preference model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        ModelId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(id: &str) -> Self {
        ModelId(id.to_string())
    }
}

impl From<String> for ModelId {
    fn from(id: String) -> Self {
        ModelId(id)
    }
}


type Erased = Arc<dyn Any + Send + Sync>;


#[derive(Default)]
struct Slot {
    value: OnceLock<Erased>,
    /// Held while the value is being constructed.
    init: Mutex<()>,
}


#[derive(Default)]
pub struct ModelCache {
    slots: Mutex<HashMap<ModelId, Arc<Slot>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the instance cached under `id`, constructing it with
    /// `construct(factory)` if there is none yet. Concurrent callers for the
    /// same id wait for the first one; `construct` runs at most once per id.
    ///
    /// When the cached instance is not a `T`, `construct` is not called and
    /// the unused factory is handed back.
    pub fn get_or_construct<T, F, C>(&self, id: &ModelId, factory: F, construct: C) -> Result<Arc<T>, F>
    where
        T: Any + Send + Sync,
        C: FnOnce(F) -> Arc<T>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(id.clone()).or_default())
        };
        if let Some(existing) = slot.value.get() {
            return downcast(existing, factory);
        }
        let _init = slot.init.lock();
        if let Some(existing) = slot.value.get() {
            return downcast(existing, factory);
        }
        let value = construct(factory);
        // Only ever set here, under the init lock, so this cannot fail.
        let _ = slot.value.set(Arc::clone(&value) as Erased);
        Ok(value)
    }

    /// True once a model for `id` has been constructed.
    pub fn contains(&self, id: &ModelId) -> bool {
        self.slots
            .lock()
            .get(id)
            .map_or(false, is_constructed)
    }

    /// Number of constructed models.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| is_constructed(slot))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identities of constructed models, sorted.
    pub fn ids(&self) -> Vec<ModelId> {
        let mut ids: Vec<ModelId> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| is_constructed(slot))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}


/// A slot still under construction does not count yet.
fn is_constructed(slot: &Arc<Slot>) -> bool {
    slot.value.get().is_some()
}


fn downcast<T, F>(existing: &Erased, factory: F) -> Result<Arc<T>, F>
where
    T: Any + Send + Sync,
{
    Arc::clone(existing).downcast::<T>().map_err(|_| factory)
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_id_returns_same_instance() {
        let cache = ModelCache::new();
        let id = ModelId::from("app");
        let a = cache.get_or_construct(&id, 1u32, Arc::new).unwrap();
        let b = cache.get_or_construct(&id, 2u32, Arc::new).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*b, 1);
    }

    #[test]
    fn distinct_ids_distinct_instances() {
        let cache = ModelCache::new();
        let a = cache.get_or_construct(&"a".into(), "a".to_string(), Arc::new).unwrap();
        let b = cache.get_or_construct(&"b".into(), "b".to_string(), Arc::new).unwrap();
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.ids(), vec![ModelId::from("a"), ModelId::from("b")]);
    }

    #[test]
    fn type_mismatch_hands_factory_back() {
        let cache = ModelCache::new();
        let id = ModelId::from("app");
        cache.get_or_construct(&id, 1u32, Arc::new).unwrap();
        let calls = AtomicUsize::new(0);
        let other: Result<Arc<String>, &str> = cache.get_or_construct(&id, "unused", |s: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            Arc::new(s.to_string())
        });
        assert_eq!(other.unwrap_err(), "unused");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn concurrent_first_access_runs_factory_once() {
        const CALLERS: usize = 16;
        let cache = Arc::new(ModelCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_construct(&ModelId::from("shared"), (), |()| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Arc::new(vec![1u8, 2, 3])
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<Arc<Vec<u8>>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn contains_stable_during_concurrent_lookups() {
        let cache = Arc::new(ModelCache::new());
        let id = ModelId::from("app");
        cache.get_or_construct(&id, 7u32, Arc::new).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let looker = {
            let cache = Arc::clone(&cache);
            let stop = Arc::clone(&stop);
            let id = id.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    cache.get_or_construct(&id, 0u32, Arc::new).unwrap();
                }
            })
        };
        for _ in 0..50_000 {
            assert!(cache.contains(&id));
            assert_eq!(cache.len(), 1);
        }
        stop.store(true, Ordering::SeqCst);
        looker.join().unwrap();
    }

    #[test]
    fn contains_false_while_constructing() {
        let cache = Arc::new(ModelCache::new());
        let started = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let builder = {
            let cache = Arc::clone(&cache);
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            thread::spawn(move || {
                cache
                    .get_or_construct(&ModelId::from("slow"), (), |()| {
                        started.wait();
                        release.wait();
                        Arc::new(1u8)
                    })
                    .unwrap()
            })
        };
        started.wait();
        assert!(!cache.contains(&ModelId::from("slow")));
        release.wait();
        builder.join().unwrap();
        assert!(cache.contains(&ModelId::from("slow")));
    }

    #[test]
    fn contains_only_after_construction() {
        let cache = ModelCache::new();
        let id = ModelId::new("later");
        assert!(!cache.contains(&id));
        assert!(cache.is_empty());
        cache.get_or_construct(&id, (), Arc::new).unwrap();
        assert!(cache.contains(&id));
        assert_eq!(id.to_string(), "later");
    }
}
