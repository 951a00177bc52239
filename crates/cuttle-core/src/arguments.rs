//! Connection arguments forwarded to a driver's connect operation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named arguments passed verbatim to a [`Connector`](crate::Connector)
///
/// Values are kept as JSON so that arguments loaded from configuration
/// files (strings, numbers, booleans) survive untouched until the driver
/// interprets them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionArguments {
    values: BTreeMap<String, serde_json::Value>,
}

impl ConnectionArguments {
    /// Create an empty argument set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an argument, returning the updated set
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set an argument in place
    pub fn insert(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Remove an argument, returning its previous value
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.values.remove(key)
    }

    /// Get the raw value of an argument
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Get an argument rendered as a string
    ///
    /// Non-string JSON values are rendered with their JSON representation,
    /// so `5` becomes `"5"` and `true` becomes `"true"`.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|val| match val {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Check whether an argument is present
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Overlay `other` on top of these arguments; keys in `other` win
    pub fn merge(&mut self, other: &ConnectionArguments) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Iterate over argument names and values in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<serde_json::Value>> FromIterator<(K, V)> for ConnectionArguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_get_string_renders_non_strings() {
        let args = ConnectionArguments::new()
            .with("host", "localhost")
            .with("port", 5432)
            .with("ssl", true);

        assert_eq!(args.get_string("host").as_deref(), Some("localhost"));
        assert_eq!(args.get_string("port").as_deref(), Some("5432"));
        assert_eq!(args.get_string("ssl").as_deref(), Some("true"));
        assert_eq!(args.get_string("user"), None);
    }

    #[test]
    fn test_merge_overrides_existing_keys() {
        let mut base = ConnectionArguments::new()
            .with("database", "rons_house")
            .with("user", "ron");
        let overrides = ConnectionArguments::new().with("database", "steakhouse");

        base.merge(&overrides);

        assert_eq!(base.get_string("database").as_deref(), Some("steakhouse"));
        assert_eq!(base.get_string("user").as_deref(), Some("ron"));
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let args: ConnectionArguments = [("path", ":memory:")].into_iter().collect();
        let json = serde_json::to_string(&args).expect("serialize");
        assert_eq!(json, r#"{"path":":memory:"}"#);

        let back: ConnectionArguments = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, args);
    }
}
