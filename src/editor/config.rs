use serde::{Deserialize, Serialize};

use crate::transaction::IsolationLevel;

/// Environment variable read by [`EditorConfig::from_env`].
pub const ISOLATION_ENV: &str = "INLINE_EDIT_DEFAULT_ISOLATION";

/// Editor configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Isolation used for owned transactions when the command leaves it
    /// unspecified. `Unspecified` here defers to the store.
    #[serde(default)]
    pub default_isolation: IsolationLevel,
}

impl EditorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default isolation level
    pub fn default_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.default_isolation = isolation;
        self
    }

    /// Parse from a JSON document
    ///
    /// ```ignore
    /// let config = EditorConfig::from_json(r#"{"default_isolation":"Serializable"}"#)?;
    /// ```
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Invalid editor config: {}", e))
    }

    /// Read overrides from the process environment
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`, e.g. a map in tests
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(ISOLATION_ENV) {
            config.default_isolation = raw
                .parse()
                .map_err(|e| format!("{}: {}", ISOLATION_ENV, e))?;
        }
        Ok(config)
    }

    /// Isolation for a command requesting `requested`.
    pub fn resolve_isolation(&self, requested: IsolationLevel) -> IsolationLevel {
        requested.or(self.default_isolation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_builder_and_resolution() {
        let config = EditorConfig::new().default_isolation(IsolationLevel::Snapshot);
        assert_eq!(
            config.resolve_isolation(IsolationLevel::Unspecified),
            IsolationLevel::Snapshot
        );
        assert_eq!(
            config.resolve_isolation(IsolationLevel::ReadCommitted),
            IsolationLevel::ReadCommitted
        );
    }

    #[test]
    fn test_from_json() {
        let config = EditorConfig::from_json(r#"{"default_isolation":"Serializable"}"#).unwrap();
        assert_eq!(config.default_isolation, IsolationLevel::Serializable);

        let empty = EditorConfig::from_json("{}").unwrap();
        assert_eq!(empty, EditorConfig::default());

        assert!(EditorConfig::from_json(r#"{"default_isolation":"Eventual"}"#).is_err());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [(ISOLATION_ENV, "repeatable read")].into();
        let config = EditorConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.default_isolation, IsolationLevel::RepeatableRead);

        let unset = EditorConfig::from_lookup(|_| None).unwrap();
        assert!(unset.default_isolation.is_unspecified());

        let bad = EditorConfig::from_lookup(|_| Some("sometimes".into()));
        assert!(bad.unwrap_err().starts_with(ISOLATION_ENV));
    }
}
