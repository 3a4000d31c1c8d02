//! Insertion-ordered metadata storage for samples and images

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Key/value metadata that keeps the order entries were added in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaStorage(IndexMap<String, Value>);

impl MetaStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry. Replacing keeps the original position.
    pub fn add(&mut self, title: impl Into<String>, content: impl Into<Value>) {
        self.0.insert(title.into(), content.into());
    }

    /// Add an entry and log it under the given owner (sample or camera name)
    pub fn add_logged(&mut self, owner: &str, title: &str, content: impl Into<Value>) {
        let content = content.into();
        info!("{} - {}: {}", owner, title, content);
        self.0.insert(title.to_string(), content);
    }

    pub fn get(&self, title: &str) -> Option<&Value> {
        self.0.get(title)
    }

    /// String value of an entry, if it is one
    pub fn get_str(&self, title: &str) -> Option<&str> {
        self.0.get(title).and_then(Value::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}
