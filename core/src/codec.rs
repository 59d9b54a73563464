//! Line codec for backing files.
//!
//! One record per line: `key;value`. Keys are controlled identifiers and are
//! never escaped; the record is split at the first delimiter, so values may
//! contain `;`. Values escape backslash, line feed and carriage return so a
//! record always stays on a single line.
//!
//! The codec is type-agnostic: it hands back raw strings and leaves coercion
//! to the entry that owns the key.

use tracing::warn;

use crate::error::PrefError;
use crate::value::PrefValue;


pub const DELIMITER: char = ';';


/// Encode a typed value as one line (without the trailing newline).
pub fn encode<T: PrefValue>(key: &str, value: &T) -> String {
    encode_raw(key, &value.to_raw())
}

/// Encode an already-stringified value.
pub fn encode_raw(key: &str, raw: &str) -> String {
    let mut line = String::with_capacity(key.len() + raw.len() + 1);
    line.push_str(key);
    line.push(DELIMITER);
    for c in raw.chars() {
        match c {
            '\\' => line.push_str("\\\\"),
            '\n' => line.push_str("\\n"),
            '\r' => line.push_str("\\r"),
            other => line.push(other),
        }
    }
    line
}

/// Split one line into `(key, raw value)`.
pub fn decode(line: &str) -> Result<(String, String), PrefError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    match line.split_once(DELIMITER) {
        Some((key, raw)) if !key.is_empty() => Ok((key.to_string(), unescape(raw))),
        Some(_) => Err(PrefError::MalformedRecord(format!("empty key in {:?}", line))),
        None => Err(PrefError::MalformedRecord(format!(
            "missing '{}' in {:?}",
            DELIMITER, line
        ))),
    }
}

/// Render a full file from records, in the given order.
pub fn encode_document<'a, I>(records: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::new();
    for (key, raw) in records {
        out.push_str(&encode_raw(key, raw));
        out.push('\n');
    }
    out
}

/// Parse a full file. Malformed lines are skipped with a warning; blank lines
/// are skipped silently.
pub fn decode_document(text: &str) -> Vec<(String, String)> {
    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match decode(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(line = idx + 1, "skipping record: {}", e),
        }
    }
    records
}


fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            // Unknown escapes are kept verbatim.
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
