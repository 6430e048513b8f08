//! Ledger configuration, read from TOML
use super::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub storage: StorageConfig,
    pub identifiers: IdentifierConfig,
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub flush_on_commit: bool,
}

// bech32 human readable prefixes for generated ids
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
    pub document_prefix: String,
    pub log_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub require_revision_reason: bool,
    pub verify_hash_before_transition: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("statements.db"),
            flush_on_commit: true,
        }
    }
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            document_prefix: "doc_".to_string(),
            log_prefix: "log_".to_string(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            require_revision_reason: true,
            verify_hash_before_transition: true,
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Same settings with the database placed at `path`.
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.path = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = LedgerConfig::from_toml_str("").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert!(config.policy.require_revision_reason);
        assert_eq!(config.identifiers.document_prefix, "doc_");
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = LedgerConfig::from_toml_str(
            r#"
            [storage]
            path = "/var/lib/statements"

            [policy]
            require_revision_reason = false
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.path, PathBuf::from("/var/lib/statements"));
        assert!(config.storage.flush_on_commit);
        assert!(!config.policy.require_revision_reason);
        assert!(config.policy.verify_hash_before_transition);
        assert_eq!(config.identifiers.log_prefix, "log_");
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(LedgerConfig::from_toml_str("[policy]\nrequire_revision_reason = \"yes\"").is_err());
    }
}
