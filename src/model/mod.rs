//! Counterexample models produced by the backend on verification failure.
//!
//! A model dump is a quoted, whitespace-separated list of
//! `name -> value` bindings. [`ModelMap`] holds the decoded bindings and
//! [`fill_in_values`] splices them back into trace lines.

pub mod decoder;
pub mod fill;

use std::collections::HashMap;

use serde::Serialize;

pub use decoder::BracketCounter;
pub use fill::fill_in_values;

/// Decoded variable-to-value bindings of one counterexample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ModelMap {
    values: HashMap<String, String>,
}

impl ModelMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a quoted model dump, logging and returning what could be read.
    ///
    /// Malformed input never raises: the result is empty when the quoting
    /// precondition fails and partial when a trailing binding is truncated.
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        let mut map = Self::new();
        map.extend(raw);
        map
    }

    /// Decode a quoted model dump, reporting a precondition failure.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedModel` when the input is not quoted.
    /// Structural problems past the precondition are logged and leave a
    /// partial map, as with [`decode`](Self::decode).
    pub fn try_decode(raw: &str) -> crate::Result<Self> {
        let mut map = Self::new();
        decoder::decode_into(raw, &mut map.values)?;
        Ok(map)
    }

    /// Add the bindings of another model dump from the same run.
    pub fn extend(&mut self, raw: &str) {
        if let Err(err) = decoder::decode_into(raw, &mut self.values) {
            tracing::error!(%err, "cannot decode counterexample model");
        }
    }

    /// Value bound to `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Whether `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no binding was decoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(name, value)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render the bindings as `name -> value` lines, sorted by name.
    #[must_use]
    pub fn pretty(&self) -> String {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_unstable();
        entries
            .into_iter()
            .map(|(name, value)| format!("{name} -> {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ModelMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
