use crate::error::{Result, SqlRepoError};
use crate::types::SqlValue;

/// An insertion-ordered column -> value mapping.
///
/// Used for insert/update fields, WHERE conditions and extra bound
/// parameters. Key order matters: generated SQL lists columns and
/// placeholders in the order keys were first inserted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueMap {
    entries: Vec<(String, SqlValue)>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a value. An existing key keeps its position and gets the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SqlValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&SqlValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<SqlValue> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn first_key(&self) -> Option<&str> {
        self.entries.first().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a copy of `self` with every entry of `other` inserted on top.
    pub fn merged(&self, other: &ValueMap) -> ValueMap {
        let mut merged = self.clone();
        for (key, value) in other.iter() {
            merged.insert(key, value.clone());
        }
        merged
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ValueMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<K: Into<String>, V: Into<SqlValue>, const N: usize> From<[(K, V); N]> for ValueMap {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl IntoIterator for ValueMap {
    type Item = (String, SqlValue);
    type IntoIter = std::vec::IntoIter<(String, SqlValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl TryFrom<&serde_json::Value> for ValueMap {
    type Error = SqlRepoError;

    /// Accepts a JSON object of scalars; key order follows the document.
    fn try_from(value: &serde_json::Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            SqlRepoError::TypeMismatch(format!("expected a JSON object, got {value}"))
        })?;

        let mut map = ValueMap::new();
        for (key, value) in object {
            map.insert(key.as_str(), SqlValue::try_from(value)?);
        }
        Ok(map)
    }
}
