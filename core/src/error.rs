//! Error taxonomy for the datastore.
//!
//! None of these reach callers of `get`/`set`/`get_or_create`: they are
//! produced internally, logged, and turned into a fallback (defaults,
//! in-memory only, or a retry on the next debounce cycle). Only the raw-key
//! APIs used by generic hosts return them directly.

use std::io;
use std::path::PathBuf;

use thiserror::Error;


#[derive(Debug, Error)]
pub enum PrefError {
    /// The datastore directory could not be created or used.
    #[error("storage unavailable at {path}: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A backing file exists but could not be read.
    #[error("cannot read {path}: {source}")]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A backing file could not be written.
    #[error("cannot write {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A line without the delimiter or with an empty key.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// A model name that cannot be used as a file stem.
    #[error("invalid model name {0:?}")]
    InvalidModelName(String),

    /// A value failed the entry's validator and the entry rejects bad writes.
    #[error("value rejected for '{key}': {reason}")]
    ValidationRejected { key: String, reason: String },

    /// Raw access named a key the model does not declare.
    #[error("unknown preference key '{0}'")]
    UnknownKey(String),

    /// Raw access supplied text that does not coerce to the entry's type.
    #[error("invalid {kind} value for '{key}': {raw:?}")]
    InvalidValue {
        key: String,
        kind: &'static str,
        raw: String,
    },
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_path_and_cause() {
        let err = PrefError::WriteFailure {
            path: PathBuf::from("/data/jetpref_datastore/app.jetpref"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("app.jetpref"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn invalid_value_quotes_raw_text() {
        let err = PrefError::InvalidValue {
            key: "audio.volume".into(),
            kind: "integer",
            raw: "loud".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid integer value for 'audio.volume': \"loud\""
        );
    }
}
