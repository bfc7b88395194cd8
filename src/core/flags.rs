//! Named boolean flags that gate content availability across scenes.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// How a flag is mutated by a dialogue or dispatch effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagOp {
    /// Set the flag to true.
    Add,
    /// Set the flag to false.
    Remove,
    /// Invert the flag; an unknown flag becomes true.
    Toggle,
}

/// A flag mutation attached to a monologue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagMutation {
    pub how: FlagOp,
    #[serde(rename = "value")]
    pub flag: String,
}

/// The flag store. Flags are created on first write and never removed;
/// an absent flag reads as false.
///
/// There is exactly one store per running game, owned by the
/// `SceneManager` and passed by reference to everything that reads
/// or writes flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagStore {
    flags: FxHashMap<String, bool>,
}

impl FlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self, flag: &str) -> bool {
        self.flags.get(flag).copied().unwrap_or(false)
    }

    pub fn set(&mut self, flag: &str) {
        self.flags.insert(flag.to_string(), true);
    }

    pub fn clear(&mut self, flag: &str) {
        self.flags.insert(flag.to_string(), false);
    }

    pub fn toggle(&mut self, flag: &str) {
        let value = !self.is_set(flag);
        self.flags.insert(flag.to_string(), value);
    }

    pub fn apply(&mut self, mutation: &FlagMutation) {
        match mutation.how {
            FlagOp::Add => self.set(&mutation.flag),
            FlagOp::Remove => self.clear(&mutation.flag),
            FlagOp::Toggle => self.toggle(&mutation.flag),
        }
    }

    /// Number of flags ever written, set or not.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Iterate over the names of flags that are currently true.
    pub fn iter_set(&self) -> impl Iterator<Item = &str> {
        self.flags
            .iter()
            .filter(|(_, on)| **on)
            .map(|(name, _)| name.as_str())
    }
}

impl<S: AsRef<str>> FromIterator<S> for FlagStore {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut store = FlagStore::new();
        for flag in iter {
            store.set(flag.as_ref());
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_flag_reads_false() {
        let store = FlagStore::new();
        assert!(!store.is_set("met_keeper"));
        assert!(store.is_empty());
    }

    #[test]
    fn set_clear_toggle() {
        let mut store = FlagStore::new();
        store.set("lamp_lit");
        assert!(store.is_set("lamp_lit"));
        store.clear("lamp_lit");
        assert!(!store.is_set("lamp_lit"));
        store.toggle("lamp_lit");
        assert!(store.is_set("lamp_lit"));
        store.toggle("never_written");
        assert!(store.is_set("never_written"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn apply_mutations() {
        let mut store = FlagStore::new();
        store.apply(&FlagMutation {
            how: FlagOp::Add,
            flag: "a".to_string(),
        });
        store.apply(&FlagMutation {
            how: FlagOp::Toggle,
            flag: "b".to_string(),
        });
        store.apply(&FlagMutation {
            how: FlagOp::Remove,
            flag: "a".to_string(),
        });
        assert!(!store.is_set("a"));
        assert!(store.is_set("b"));
        assert_eq!(store.iter_set().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn mutation_parses_descriptor_field_names() {
        let m: FlagMutation = serde_json::from_str(r#"{"how": "toggle", "value": "door_open"}"#).unwrap();
        assert_eq!(m.how, FlagOp::Toggle);
        assert_eq!(m.flag, "door_open");
    }
}
