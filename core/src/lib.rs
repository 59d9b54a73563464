//! JetPref datastore: typed, cached, file-backed preference models.
//!
//! A host declares a model as a plain struct of `Preference<T>` fields built
//! through a `ModelBuilder`, then asks the `Datastore` for it by identity.
//! The first request loads the model's backing file; writes are validated,
//! observed, and saved by a background worker after a quiet period.
//!
//! # Modules
//!
//! - [`value`]: supported value types and enumerated-string preferences
//! - [`codec`]: the `key;value` line format of backing files
//! - [`entry`]: `Preference<T>` and validators
//! - [`group`]: key prefixes and model declaration
//! - [`model`]: model state, dirty tracking, host-facing handles
//! - [`binding`]: observers, subscriptions, live views for UI layers
//! - [`cache`]: one instance per model identity
//! - [`storage`]: file, volatile and in-memory backends
//! - [`persist`]: debounced background saving
//! - [`datastore`]: the entry point tying it together

pub mod binding;
pub mod cache;
pub mod codec;
pub mod config;
pub mod datastore;
pub mod entry;
pub mod error;
pub mod group;
pub mod model;
pub mod persist;
pub mod storage;
pub mod value;

pub use binding::{ObservablePreference, Observer, PreferenceState, Subscription};
pub use cache::{ModelCache, ModelId};
pub use codec::{decode, decode_document, encode, encode_document, encode_raw, DELIMITER};
pub use config::DatastoreConfig;
pub use datastore::Datastore;
pub use entry::{OutOfRange, Preference, Validator};
pub use error::PrefError;
pub use group::{ModelBuilder, PreferenceGroup, KEY_SEPARATOR};
pub use model::{EntryInfo, ModelHandle};
pub use persist::PersistenceManager;
pub use storage::{FileStorage, MemoryStorage, PrefStorage, VolatileStorage};
pub use value::{PrefKind, PrefValue};
