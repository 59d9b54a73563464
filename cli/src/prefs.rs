//! The `app` model the CLI operates on.

use jetpref_datastore::{pref_enum, ModelBuilder, OutOfRange, Preference, Validator};


pub const MODEL_ID: &str = "app";


pref_enum! {
    pub enum Theme {
        System => "system",
        Light => "light",
        Dark => "dark",
    }
}


pub struct AppPrefs {
    pub theme: Preference<Theme>,
    pub language: Preference<String>,
    pub volume: Preference<i32>,
    pub muted: Preference<bool>,
    pub repeat_rate: Preference<f64>,
}


pub fn declare(b: &mut ModelBuilder) -> AppPrefs {
    let theme = b.preference("theme", Theme::System);
    let language = b.validated(
        "language",
        String::from("en"),
        Validator::predicate(|tag: &String| !tag.trim().is_empty(), "language tag is empty"),
    );
    let (volume, muted) = b.group("audio", |b| {
        let volume = b.validated("volume", 50, Validator::range(0, 100, OutOfRange::Clamp));
        let muted = b.preference("muted", false);
        (volume, muted)
    });
    let repeat_rate = b.group("keyboard", |b| {
        b.validated("repeat_rate", 25.0, Validator::range(1.0, 60.0, OutOfRange::Reject))
    });
    AppPrefs {
        theme,
        language,
        volume,
        muted,
        repeat_rate,
    }
}
