//! Preference entries.
//!
//! A `Preference<T>` is a cheap, cloneable handle to one typed value inside
//! a model. Writes update memory and notify observers on the caller's
//! thread, then mark the owning model dirty; the disk write happens later on
//! the persistence worker.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::binding::{Observer, ObserverList, Subscription};
use crate::error::PrefError;
use crate::model::ModelSync;
use crate::value::{PrefKind, PrefValue};


/// What a range validator does with an out-of-range write.
///
/// Every ranged entry names its policy; there is no default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfRange {
    /// Keep the previous value and log the rejected write.
    Reject,
    /// Store the nearest bound instead.
    Clamp,
}


/// Validation or transform rule attached to an entry at declaration time.
pub struct Validator<T> {
    rule: Arc<dyn Fn(T) -> Result<T, String> + Send + Sync>,
}

impl<T> Clone for Validator<T> {
    fn clone(&self) -> Self {
        Validator {
            rule: Arc::clone(&self.rule),
        }
    }
}

impl<T> fmt::Debug for Validator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator")
    }
}

impl<T: PrefValue> Validator<T> {
    /// Inclusive range check.
    ///
    /// A value that compares to neither bound (a float NaN) is out of range:
    /// rejected, or clamped to `min`.
    pub fn range(min: T, max: T, policy: OutOfRange) -> Self
    where
        T: PartialOrd,
    {
        Validator {
            rule: Arc::new(move |value: T| {
                if value >= min && value <= max {
                    return Ok(value);
                }
                match policy {
                    OutOfRange::Clamp if value > max => Ok(max.clone()),
                    OutOfRange::Clamp => Ok(min.clone()),
                    OutOfRange::Reject => Err(format!(
                        "{:?} outside {:?}..={:?}",
                        value, min, max
                    )),
                }
            }),
        }
    }

    /// Reject any value for which `accept` returns false.
    pub fn predicate<F>(accept: F, reason: &str) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let reason = reason.to_string();
        Validator {
            rule: Arc::new(move |value: T| {
                if accept(&value) {
                    Ok(value)
                } else {
                    Err(format!("{:?}: {}", value, reason))
                }
            }),
        }
    }

    /// Reject anything not in `allowed`.
    pub fn one_of(allowed: Vec<T>) -> Self {
        Validator {
            rule: Arc::new(move |value: T| {
                if allowed.contains(&value) {
                    Ok(value)
                } else {
                    Err(format!("{:?} not one of {:?}", value, allowed))
                }
            }),
        }
    }

    /// Coerce every write, e.g. trimming or normalizing case.
    pub fn transform<F>(map: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        Validator {
            rule: Arc::new(move |value: T| Ok(map(value))),
        }
    }

    pub fn apply(&self, value: T) -> Result<T, String> {
        (self.rule)(value)
    }
}


/// A single named, typed, observable preference value.
pub struct Preference<T: PrefValue> {
    inner: Arc<PrefInner<T>>,
}

struct PrefInner<T: PrefValue> {
    key: String,
    default: T,
    value: Mutex<T>,
    validator: Option<Validator<T>>,
    observers: Arc<ObserverList<T>>,
    sync: Arc<ModelSync>,
}

impl<T: PrefValue> Clone for Preference<T> {
    fn clone(&self) -> Self {
        Preference {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: PrefValue> fmt::Debug for Preference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preference")
            .field("key", &self.inner.key)
            .field("value", &*self.inner.value.lock())
            .field("default", &self.inner.default)
            .finish()
    }
}

impl<T: PrefValue> Preference<T> {
    pub(crate) fn new(
        key: String,
        default: T,
        validator: Option<Validator<T>>,
        sync: Arc<ModelSync>,
    ) -> Self {
        // Defaults obey the validator too.
        let default = match &validator {
            Some(v) => match v.apply(default.clone()) {
                Ok(valid) => {
                    if valid != default {
                        warn!(key = %key, "default value adjusted by its validator");
                    }
                    valid
                }
                Err(reason) => {
                    error!(key = %key, %reason, "default value rejected by its own validator");
                    default
                }
            },
            None => default,
        };
        Preference {
            inner: Arc::new(PrefInner {
                key,
                value: Mutex::new(default.clone()),
                default,
                validator,
                observers: Arc::new(ObserverList::new()),
                sync,
            }),
        }
    }

    /// Fully-qualified key, including group prefixes.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn get(&self) -> T {
        self.inner.value.lock().clone()
    }

    pub fn default_value(&self) -> &T {
        &self.inner.default
    }

    pub fn is_default(&self) -> bool {
        *self.inner.value.lock() == self.inner.default
    }

    /// Write a new value.
    ///
    /// The validator runs first; a rejected value leaves the entry untouched
    /// and is only logged. Observers are called synchronously on this
    /// thread, without any lock held.
    ///
    /// Notifications from concurrent writers may arrive out of order. An
    /// observer that needs the latest value reads it back with `get`, as
    /// `PreferenceState` does.
    pub fn set(&self, value: T) {
        if let Err(e) = self.try_set(value) {
            warn!("{}", e);
        }
    }

    /// Restore the declared default.
    pub fn reset(&self) {
        self.set(self.inner.default.clone());
    }

    /// Register an observer called with every new value.
    ///
    /// The observer stays registered until the returned subscription is
    /// unsubscribed or dropped.
    pub fn observe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_observer(Arc::new(observer))
    }

    pub(crate) fn subscribe_observer(&self, observer: Observer<T>) -> Subscription {
        let id = self.inner.observers.add(observer);
        Subscription::new(id, &self.inner.observers)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    pub(crate) fn try_set(&self, value: T) -> Result<(), PrefError> {
        let value = self.validate(value)?;
        *self.inner.value.lock() = value.clone();
        self.inner.sync.mark_dirty();
        self.inner.observers.notify(&value);
        Ok(())
    }

    fn validate(&self, value: T) -> Result<T, PrefError> {
        match &self.inner.validator {
            Some(v) => v.apply(value).map_err(|reason| PrefError::ValidationRejected {
                key: self.inner.key.clone(),
                reason,
            }),
            None => Ok(value),
        }
    }
}


// ---------------------------------------------------------------------------
// Type-erased access used by groups, models and raw-key hosts
// ---------------------------------------------------------------------------

pub(crate) trait ErasedPreference: Send + Sync {
    fn key(&self) -> &str;
    fn kind(&self) -> PrefKind;
    fn choices(&self) -> &'static [&'static str];
    fn raw_value(&self) -> String;
    fn raw_default(&self) -> String;

    /// Apply a stored value without notifying or dirtying.
    ///
    /// Returns true when the stored text could not be used as-is (bad
    /// coercion, rejected, or coerced by the validator) so the model knows
    /// its file needs a rewrite.
    fn load_raw(&self, raw: &str) -> bool;

    fn set_raw(&self, raw: &str) -> Result<(), PrefError>;
    fn reset(&self);
}

impl<T: PrefValue> ErasedPreference for Preference<T> {
    fn key(&self) -> &str {
        &self.inner.key
    }

    fn kind(&self) -> PrefKind {
        T::KIND
    }

    fn choices(&self) -> &'static [&'static str] {
        T::choices()
    }

    fn raw_value(&self) -> String {
        self.inner.value.lock().to_raw()
    }

    fn raw_default(&self) -> String {
        self.inner.default.to_raw()
    }

    fn load_raw(&self, raw: &str) -> bool {
        let parsed = match T::from_raw(raw) {
            Some(v) => v,
            None => {
                warn!(key = %self.inner.key, raw, kind = %T::KIND, "stored value does not coerce; using default");
                *self.inner.value.lock() = self.inner.default.clone();
                return true;
            }
        };
        match self.validate(parsed.clone()) {
            Ok(valid) => {
                // Compare stored forms: NaN never equals itself.
                let corrected = valid.to_raw() != parsed.to_raw();
                if corrected {
                    debug!(key = %self.inner.key, raw, "stored value adjusted by validator");
                }
                *self.inner.value.lock() = valid;
                corrected
            }
            Err(e) => {
                warn!("{}; using default", e);
                *self.inner.value.lock() = self.inner.default.clone();
                true
            }
        }
    }

    fn set_raw(&self, raw: &str) -> Result<(), PrefError> {
        let value = T::from_raw(raw).ok_or_else(|| PrefError::InvalidValue {
            key: self.inner.key.clone(),
            kind: T::KIND.as_str(),
            raw: raw.to_string(),
        })?;
        self.try_set(value)
    }

    fn reset(&self) {
        Preference::reset(self)
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
