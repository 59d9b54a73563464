//! Preference groups and model declaration.
//!
//! A model is declared through a `ModelBuilder` handed to the model factory.
//! Groups nest by prefix: an entry `volume` declared inside group `audio`
//! has the fully-qualified key `audio.volume`.

use std::sync::Arc;

use crate::entry::{ErasedPreference, Preference, Validator};
use crate::model::{ModelState, ModelSync};
use crate::value::PrefValue;


/// Separator between group prefixes and entry keys.
pub const KEY_SEPARATOR: char = '.';


enum Node {
    Entry(Arc<dyn ErasedPreference>),
    Group(PreferenceGroup),
}


/// Ordered collection of entries and sub-groups sharing a key prefix.
///
/// Order is declaration order and only matters for file layout.
pub struct PreferenceGroup {
    prefix: String,
    nodes: Vec<Node>,
}

impl PreferenceGroup {
    fn new(prefix: String) -> Self {
        PreferenceGroup {
            prefix,
            nodes: Vec::new(),
        }
    }

    /// Fully-qualified prefix; empty for the model root.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Keys of every entry in this group and its sub-groups, in
    /// declaration order.
    pub fn keys(&self) -> Vec<String> {
        self.entries().iter().map(|e| e.key().to_string()).collect()
    }

    /// Direct sub-groups.
    pub fn groups(&self) -> impl Iterator<Item = &PreferenceGroup> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Group(g) => Some(g),
            Node::Entry(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn entries(&self) -> Vec<Arc<dyn ErasedPreference>> {
        let mut out = Vec::new();
        self.collect_entries(&mut out);
        out
    }

    fn collect_entries(&self, out: &mut Vec<Arc<dyn ErasedPreference>>) {
        for node in &self.nodes {
            match node {
                Node::Entry(e) => out.push(Arc::clone(e)),
                Node::Group(g) => g.collect_entries(out),
            }
        }
    }
}


/// Declares the entries of one model.
pub struct ModelBuilder {
    id: String,
    name: String,
    sync: Arc<ModelSync>,
    /// Open groups; the first element is the model root.
    stack: Vec<PreferenceGroup>,
}

impl ModelBuilder {
    /// The backing file name defaults to the identity.
    pub fn new(id: &str) -> Self {
        ModelBuilder {
            id: id.to_string(),
            name: id.to_string(),
            sync: Arc::new(ModelSync::new()),
            stack: vec![PreferenceGroup::new(String::new())],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Override the backing file name (without extension).
    pub fn file_name(&mut self, name: &str) -> &mut Self {
        self.name = name.to_string();
        self
    }

    /// Declare an entry without validation.
    pub fn preference<T: PrefValue>(&mut self, key: &str, default: T) -> Preference<T> {
        self.declare(key, default, None)
    }

    /// Declare an entry whose writes pass through `validator`.
    pub fn validated<T: PrefValue>(
        &mut self,
        key: &str,
        default: T,
        validator: Validator<T>,
    ) -> Preference<T> {
        self.declare(key, default, Some(validator))
    }

    /// Declare a nested group. Entries declared inside `declare` get
    /// `prefix` prepended to their keys.
    pub fn group<R>(&mut self, prefix: &str, declare: impl FnOnce(&mut ModelBuilder) -> R) -> R {
        let qualified = self.qualify(prefix);
        self.stack.push(PreferenceGroup::new(qualified));
        let result = declare(self);
        if let Some(group) = self.stack.pop() {
            self.current().nodes.push(Node::Group(group));
        }
        result
    }

    pub(crate) fn finish(mut self) -> ModelState {
        let root = self.stack.swap_remove(0);
        ModelState::new(self.id, self.name, root, self.sync)
    }

    fn declare<T: PrefValue>(
        &mut self,
        key: &str,
        default: T,
        validator: Option<Validator<T>>,
    ) -> Preference<T> {
        let pref = Preference::new(self.qualify(key), default, validator, Arc::clone(&self.sync));
        let erased: Arc<dyn ErasedPreference> = Arc::new(pref.clone());
        self.current().nodes.push(Node::Entry(erased));
        pref
    }

    fn qualify(&self, key: &str) -> String {
        let prefix = self.stack.last().map(|g| g.prefix.as_str()).unwrap_or("");
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}{}", prefix, KEY_SEPARATOR, key)
        }
    }

    fn current(&mut self) -> &mut PreferenceGroup {
        // The root is never popped, so the stack is never empty.
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_groups_qualify_keys() {
        let mut b = ModelBuilder::new("app");
        let theme = b.preference("theme", "system".to_string());
        let volume = b.group("audio", |b| {
            b.group("output", |b| b.preference("volume", 50i32))
        });
        assert_eq!(theme.key(), "theme");
        assert_eq!(volume.key(), "audio.output.volume");
    }

    #[test]
    fn keys_follow_declaration_order() {
        let mut b = ModelBuilder::new("app");
        b.preference("z_last_alpha", 1i32);
        b.group("audio", |b| {
            b.preference("volume", 50i32);
            b.preference("muted", false);
        });
        b.preference("a_first_alpha", true);
        let state = b.finish();
        assert_eq!(
            state.layout().keys(),
            vec!["z_last_alpha", "audio.volume", "audio.muted", "a_first_alpha"]
        );
    }

    #[test]
    fn group_exposes_prefix_and_children() {
        let mut b = ModelBuilder::new("app");
        b.group("keyboard", |b| {
            b.preference("repeat", true);
            b.group("layout", |b| b.preference("primary", "qwerty".to_string()));
        });
        let state = b.finish();
        let root = state.layout();
        assert_eq!(root.prefix(), "");
        assert_eq!(root.len(), 1);
        let keyboard = root.groups().next().unwrap();
        assert_eq!(keyboard.prefix(), "keyboard");
        assert_eq!(keyboard.keys(), vec!["keyboard.repeat", "keyboard.layout.primary"]);
        let layout = keyboard.groups().next().unwrap();
        assert_eq!(layout.prefix(), "keyboard.layout");
    }

    #[test]
    fn file_name_defaults_to_identity() {
        let b = ModelBuilder::new("settings");
        assert_eq!(b.finish().name(), "settings");

        let mut b = ModelBuilder::new("settings");
        b.file_name("prefs_v2");
        let state = b.finish();
        assert_eq!(state.id(), "settings");
        assert_eq!(state.name(), "prefs_v2");
    }
}
