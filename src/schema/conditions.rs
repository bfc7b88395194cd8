use serde::{Deserialize, Serialize};

use crate::core::flags::FlagStore;

/// A predicate over the flag store.
///
/// Satisfied iff every `all` flag is set, at least one `any` flag is set
/// (vacuously true when `any` is empty), and no `not` flag is set.
/// Evaluation never mutates anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(default)]
    pub all: Vec<String>,
    #[serde(default)]
    pub any: Vec<String>,
    #[serde(default)]
    pub not: Vec<String>,
}

impl Conditions {
    /// Conditions that are always satisfied.
    pub fn always() -> Self {
        Self::default()
    }

    pub fn all_of(flags: &[&str]) -> Self {
        Self {
            all: flags.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn any_of(flags: &[&str]) -> Self {
        Self {
            any: flags.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn none_of(flags: &[&str]) -> Self {
        Self {
            not: flags.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn is_unconditional(&self) -> bool {
        self.all.is_empty() && self.any.is_empty() && self.not.is_empty()
    }

    pub fn satisfied(&self, flags: &FlagStore) -> bool {
        self.all.iter().all(|f| flags.is_set(f))
            && (self.any.is_empty() || self.any.iter().any(|f| flags.is_set(f)))
            && !self.not.iter().any(|f| flags.is_set(f))
    }

    /// Every flag name this predicate reads.
    pub fn referenced_flags(&self) -> impl Iterator<Item = &str> {
        self.all
            .iter()
            .chain(self.any.iter())
            .chain(self.not.iter())
            .map(|f| f.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(flags: &[&str]) -> FlagStore {
        flags.iter().collect()
    }

    #[test]
    fn empty_conditions_always_hold() {
        assert!(Conditions::always().satisfied(&FlagStore::new()));
        assert!(Conditions::always().is_unconditional());
    }

    #[test]
    fn all_requires_membership() {
        let c = Conditions::all_of(&["a"]);
        assert!(c.satisfied(&store(&["a"])));
        assert!(!c.satisfied(&store(&["b"])));
    }

    #[test]
    fn any_requires_one_member() {
        let c = Conditions::any_of(&["x", "y"]);
        assert!(c.satisfied(&store(&["x"])));
        assert!(c.satisfied(&store(&["y"])));
        assert!(c.satisfied(&store(&["x", "y"])));
        assert!(!c.satisfied(&store(&["z"])));
    }

    #[test]
    fn not_vetoes_everything_else() {
        let c = Conditions {
            all: vec!["a".to_string()],
            any: vec!["x".to_string()],
            not: vec!["z".to_string()],
        };
        assert!(c.satisfied(&store(&["a", "x"])));
        assert!(!c.satisfied(&store(&["a", "x", "z"])));
        assert!(!Conditions::none_of(&["z"]).satisfied(&store(&["z"])));
        assert!(Conditions::none_of(&["z"]).satisfied(&store(&[])));
    }

    #[test]
    fn cleared_flag_counts_as_unset() {
        let mut flags = store(&["a"]);
        flags.clear("a");
        assert!(!Conditions::all_of(&["a"]).satisfied(&flags));
    }

    #[test]
    fn parses_partial_blocks() {
        let c: Conditions = serde_json::from_str(r#"{"not": ["rescued"]}"#).unwrap();
        assert!(c.all.is_empty());
        assert_eq!(c.not, vec!["rescued".to_string()]);
        assert_eq!(c.referenced_flags().count(), 1);
    }
}
