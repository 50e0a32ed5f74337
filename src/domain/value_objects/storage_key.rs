use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn new(value: String) -> Result<Self, String> {
        Self::validate(&value)?;
        Ok(Self(value))
    }

    /// `namespace:key` 形式のキーを組み立てる。
    pub fn namespaced(namespace: &str, key: &str) -> Result<Self, String> {
        Self::validate(key)?;
        let namespace = namespace.trim();
        if namespace.is_empty() {
            return Self::new(key.to_string());
        }
        Self::new(format!("{namespace}:{key}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("Storage key cannot be empty".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<StorageKey> for String {
    fn from(key: StorageKey) -> Self {
        key.0
    }
}
