//! Placeholder bindings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Binding key for the subject identifier.
pub const SUBJECT: &str = "subject";

/// Binding key for the run identifier.
pub const RUN: &str = "run";

/// Binding key for a unit's outcome label, only visible to report fragments.
pub const STATUS: &str = "status";

/// An ordered mapping from placeholder name to value.
///
/// Later layers win: [`Bindings::layered`] overlays one map onto another,
/// which is how config roots, stage parameters, `--set` variables and the
/// unit's subject and run are combined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bindings(BTreeMap<String, String>);

impl Bindings {
    /// Creates an empty binding map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the bindings that identify one (subject, run) pair.
    #[must_use]
    pub fn for_unit(subject: &str, run: &str) -> Self {
        Self::new().with(SUBJECT, subject).with(RUN, run)
    }

    /// Adds a binding, replacing any previous value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a binding, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Looks up a binding.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns true if `key` is bound.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns a copy of `self` with `other` overlaid on top.
    #[must_use]
    pub fn layered(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        merged.extend_from(other);
        merged
    }

    /// Overlays `other` onto `self`.
    pub fn extend_from(&mut self, other: &Self) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Iterates over bound names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterates over `(name, value)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Bindings
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_unit() {
        let bindings = Bindings::for_unit("sub01", "2");
        assert_eq!(bindings.get(SUBJECT), Some("sub01"));
        assert_eq!(bindings.get(RUN), Some("2"));
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn test_layered_later_wins() {
        let defaults = Bindings::new().with("fwhm", "6").with("scan", "movie");
        let overrides = Bindings::new().with("scan", "rest");

        let merged = defaults.layered(&overrides);

        assert_eq!(merged.get("fwhm"), Some("6"));
        assert_eq!(merged.get("scan"), Some("rest"));
        // the base is untouched
        assert_eq!(defaults.get("scan"), Some("movie"));
    }

    #[test]
    fn test_keys_sorted() {
        let bindings: Bindings = [("run", "1"), ("output_root", "/out"), ("subject", "A")]
            .into_iter()
            .collect();
        let keys: Vec<_> = bindings.keys().collect();
        assert_eq!(keys, vec!["output_root", "run", "subject"]);
    }

    #[test]
    fn test_serde_transparent() {
        let bindings = Bindings::new().with("scan", "movie");
        let json = serde_json::to_string(&bindings).unwrap();
        assert_eq!(json, r#"{"scan":"movie"}"#);
    }
}
