//! Supported preference value types and their canonical text forms.

use std::fmt;


/// Semantic type of a preference entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefKind {
    Boolean,
    Integer,
    Float,
    String,
    /// A string restricted to a fixed set of choices.
    Enum,
}

impl PrefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrefKind::Boolean => "boolean",
            PrefKind::Integer => "integer",
            PrefKind::Float => "float",
            PrefKind::String => "string",
            PrefKind::Enum => "enum",
        }
    }
}

impl fmt::Display for PrefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


/// A type that can be stored in a preference entry.
///
/// `to_raw` must produce the canonical form that `from_raw` accepts, so
/// that every value survives a save/load cycle.
pub trait PrefValue: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    const KIND: PrefKind;

    fn to_raw(&self) -> String;

    /// Coerce a stored string. `None` means the text is not a valid value of
    /// this type and the entry falls back to its default.
    fn from_raw(raw: &str) -> Option<Self>;

    /// The allowed raw values for enumerated types; empty otherwise.
    fn choices() -> &'static [&'static str] {
        &[]
    }
}


impl PrefValue for bool {
    const KIND: PrefKind = PrefKind::Boolean;

    fn to_raw(&self) -> String {
        if *self { "true" } else { "false" }.to_string()
    }

    fn from_raw(raw: &str) -> Option<Self> {
        match raw {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }
}

impl PrefValue for String {
    const KIND: PrefKind = PrefKind::String;

    fn to_raw(&self) -> String {
        self.clone()
    }

    fn from_raw(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

macro_rules! impl_parsed_value {
    ($kind:expr => $($ty:ty),+) => {
        $(
            impl PrefValue for $ty {
                const KIND: PrefKind = $kind;

                fn to_raw(&self) -> String {
                    self.to_string()
                }

                fn from_raw(raw: &str) -> Option<Self> {
                    raw.trim().parse().ok()
                }
            }
        )+
    };
}

impl_parsed_value!(PrefKind::Integer => i32, i64, u32, u64);
impl_parsed_value!(PrefKind::Float => f32, f64);


/// Declare an enum usable as an enumerated-string preference.
///
/// ```
/// jetpref_datastore::pref_enum! {
///     pub enum Theme {
///         System => "system",
///         Light => "light",
///         Dark => "dark",
///     }
/// }
///
/// use jetpref_datastore::PrefValue;
/// assert_eq!(Theme::Dark.to_raw(), "dark");
/// assert_eq!(Theme::from_raw("light"), Some(Theme::Light));
/// ```
#[macro_export]
macro_rules! pref_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $raw:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $raw),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $crate::PrefValue for $name {
            const KIND: $crate::PrefKind = $crate::PrefKind::Enum;

            fn to_raw(&self) -> String {
                self.as_str().to_string()
            }

            fn from_raw(raw: &str) -> Option<Self> {
                match raw {
                    $($raw => Some($name::$variant),)+
                    _ => None,
                }
            }

            fn choices() -> &'static [&'static str] {
                &[$($raw),+]
            }
        }
    };
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    crate::pref_enum! {
        enum Layout {
            Qwerty => "qwerty",
            Dvorak => "dvorak",
        }
    }

    fn through_codec<T: PrefValue>(value: T) -> Option<T> {
        let line = codec::encode("k", &value);
        let (_, raw) = codec::decode(&line).unwrap();
        T::from_raw(&raw)
    }

    #[test]
    fn integers_round_trip_exactly() {
        for v in [i32::MIN, -1, 0, 50, i32::MAX] {
            assert_eq!(through_codec(v), Some(v));
        }
        assert_eq!(through_codec(u64::MAX), Some(u64::MAX));
        assert_eq!(through_codec(i64::MIN), Some(i64::MIN));
    }

    #[test]
    fn booleans_round_trip() {
        assert_eq!(through_codec(true), Some(true));
        assert_eq!(through_codec(false), Some(false));
    }

    #[test]
    fn floats_round_trip() {
        for v in [0.0f64, -1.5, 0.1, 1e-12, 12345.678] {
            let back = through_codec(v).unwrap();
            assert!((back - v).abs() <= f64::EPSILON * v.abs().max(1.0));
        }
        let back = through_codec(0.3f32).unwrap();
        assert!((back - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn strings_round_trip() {
        for v in ["", "hello world", "semi;colon", "line\nbreak"] {
            assert_eq!(through_codec(v.to_string()), Some(v.to_string()));
        }
    }

    #[test]
    fn enum_round_trip_and_choices() {
        assert_eq!(through_codec(Layout::Dvorak), Some(Layout::Dvorak));
        assert_eq!(Layout::choices(), &["qwerty", "dvorak"]);
        assert_eq!(Layout::KIND, PrefKind::Enum);
        assert_eq!(Layout::ALL.len(), 2);
    }

    #[test]
    fn bad_text_does_not_coerce() {
        assert_eq!(i32::from_raw("notanumber"), None);
        assert_eq!(bool::from_raw("yes"), None);
        assert_eq!(bool::from_raw("TRUE"), None);
        assert_eq!(f64::from_raw(""), None);
        assert_eq!(Layout::from_raw("azerty"), None);
    }

    #[test]
    fn kind_names() {
        assert_eq!(i64::KIND.to_string(), "integer");
        assert_eq!(<String as PrefValue>::KIND.as_str(), "string");
    }
}
