//! Name-pattern capture of caller state for worker reproduction.
//!
//! Instead of reflectively scanning the host's global state, callers
//! populate a [`CaptureRegistry`] at startup with the named values they may
//! want to ship to workers. [`CaptureRegistry::capture`] then snapshots the
//! entries whose names match an inclusion pattern, filtered by an optional
//! exclusion pattern and value predicate, producing the [`Binding`]s to
//! prepend to a task.
//!
//! Capture is a one-shot snapshot: worker-side mutation never propagates
//! back, and iteration order is unspecified — callers must not rely on the
//! order of the returned bindings.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::protocol::Binding;

/// Exclusion pattern applied when the caller supplies none: registry
/// bookkeeping entries are `__`-prefixed and never leave the process by
/// default.
pub const DEFAULT_EXCLUDE: &str = "^__";

/// Predicate over candidate values, applied after name filtering.
pub type ValuePredicate = dyn Fn(&Value) -> bool;

/// Typed registry of named state available for capture.
///
/// # Examples
///
/// ```
/// use offload::CaptureRegistry;
///
/// let mut registry = CaptureRegistry::new();
/// registry.bind("mail-x", &1).unwrap();
/// registry.bind("mail-y", &2).unwrap();
/// registry.bind("other-z", &3).unwrap();
///
/// let bindings = registry.capture("^mail-").unwrap();
/// assert_eq!(bindings.len(), 2);
/// assert!(bindings.iter().all(|b| b.name.starts_with("mail-")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CaptureRegistry {
    entries: BTreeMap<String, Value>,
}

impl CaptureRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to a snapshot of `value`.
    ///
    /// Rebinding an existing name replaces the previous value. Fails with
    /// a marshal error when the value cannot be represented as JSON —
    /// reported here, before any task references the name.
    pub fn bind<T: Serialize>(&mut self, name: impl Into<String>, value: &T) -> Result<()> {
        self.entries
            .insert(name.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Removes a binding, returning its value if present.
    pub fn unbind(&mut self, name: &str) -> Option<Value> {
        self.entries.remove(name)
    }

    /// Looks up a bound value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// Number of bound names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshots every entry whose name matches `include`, with the
    /// default exclusion pattern and no value predicate.
    pub fn capture(&self, include: &str) -> Result<Vec<Binding>> {
        self.capture_filtered(include, None, None)
    }

    /// Snapshots entries by name pattern with full filtering control.
    ///
    /// A name is kept iff it matches `include`, does not match `exclude`
    /// (defaulting to [`DEFAULT_EXCLUDE`]), and `predicate` accepts its
    /// value (defaulting to accept-all).
    ///
    /// # Examples
    ///
    /// ```
    /// use offload::CaptureRegistry;
    /// use serde_json::Value;
    ///
    /// let mut registry = CaptureRegistry::new();
    /// registry.bind("mail-count", &4).unwrap();
    /// registry.bind("mail-host", &"smtp.example.org").unwrap();
    ///
    /// let only_numbers = registry
    ///     .capture_filtered("^mail-", Some(&|v: &Value| v.is_number()), None)
    ///     .unwrap();
    /// assert_eq!(only_numbers.len(), 1);
    /// assert_eq!(only_numbers[0].name, "mail-count");
    /// ```
    pub fn capture_filtered(
        &self,
        include: &str,
        predicate: Option<&ValuePredicate>,
        exclude: Option<&str>,
    ) -> Result<Vec<Binding>> {
        let include = Regex::new(include)?;
        let exclude = Regex::new(exclude.unwrap_or(DEFAULT_EXCLUDE))?;

        let bindings: Vec<Binding> = self
            .entries
            .iter()
            .filter(|(name, _)| include.is_match(name) && !exclude.is_match(name))
            .filter(|(_, value)| predicate.is_none_or(|p| p(value)))
            .map(|(name, value)| Binding {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();

        tracing::debug!(
            include = %include,
            captured = bindings.len(),
            "captured registry snapshot"
        );
        Ok(bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> CaptureRegistry {
        let mut r = CaptureRegistry::new();
        r.bind("mail-x", &1).unwrap();
        r.bind("mail-y", &2).unwrap();
        r.bind("other-z", &3).unwrap();
        r.bind("__mail-scratch", &"internal").unwrap();
        r
    }

    #[test]
    fn capture_filters_by_inclusion_pattern() {
        let bindings = registry().capture("^mail-").unwrap();
        let names: Vec<&str> = bindings.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["mail-x", "mail-y"]);
    }

    #[test]
    fn default_exclude_drops_bookkeeping_names() {
        // "mail" appears in the bookkeeping entry too, but the default
        // exclusion keeps it out.
        let bindings = registry().capture("mail").unwrap();
        assert!(bindings.iter().all(|b| !b.name.starts_with("__")));
    }

    #[test]
    fn explicit_exclude_overrides_default() {
        let bindings = registry()
            .capture_filtered("mail", None, Some("-y$"))
            .unwrap();
        let names: Vec<&str> = bindings.iter().map(|b| b.name.as_str()).collect();
        // The custom exclude replaces the default, so the __-prefixed
        // entry is back in play.
        assert_eq!(names, vec!["__mail-scratch", "mail-x"]);
    }

    #[test]
    fn predicate_filters_by_value() {
        let mut r = registry();
        r.bind("mail-host", &"smtp").unwrap();
        let bindings = r
            .capture_filtered("^mail-", Some(&|v: &Value| v.is_number()), None)
            .unwrap();
        assert!(bindings.iter().all(|b| b.value.is_number()));
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn rebind_replaces_value() {
        let mut r = registry();
        r.bind("mail-x", &json!({"nested": [1, 2]})).unwrap();
        assert_eq!(r.get("mail-x"), Some(&json!({"nested": [1, 2]})));
        assert_eq!(r.len(), 4);
    }

    #[test]
    fn bad_pattern_is_reported() {
        let err = registry().capture("(unclosed").unwrap_err();
        assert!(matches!(err, crate::Error::Pattern { .. }));
    }

    #[test]
    fn capture_is_a_snapshot() {
        let mut r = registry();
        let before = r.capture("^mail-x$").unwrap();
        r.bind("mail-x", &99).unwrap();
        assert_eq!(before[0].value, json!(1));
    }
}
