//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::api::Sort;
use crate::error::{Result, VaultError};
use crate::keys::CURRENT_PBKDF2_ITERATIONS;

/// Configuration for the migration engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Records requested per page.
    pub page_size: u32,

    /// Updates sent per bulk-update request.
    pub batch_size: usize,

    /// Field the listing is sorted on. Must give a stable order.
    pub sort_field: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            batch_size: 50,
            sort_field: "id".to_string(),
        }
    }
}

impl MigrationConfig {
    pub fn sort(&self) -> Sort {
        Sort::ascending(self.sort_field.clone())
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// PBKDF2 iterations for newly wrapped keys. Existing accounts keep
    /// the count stored with their salt.
    pub pbkdf2_iterations: u32,

    /// Create a DEK automatically at the first login of a legacy account.
    pub silent_migration: bool,

    pub migration: MigrationConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: CURRENT_PBKDF2_ITERATIONS,
            silent_migration: true,
            migration: MigrationConfig::default(),
        }
    }
}

impl VaultConfig {
    /// Parse and validate a JSON config. Missing keys take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pbkdf2_iterations == 0 {
            return Err(VaultError::Config("pbkdf2_iterations must be positive".into()));
        }
        if self.migration.page_size == 0 {
            return Err(VaultError::Config("migration.page_size must be positive".into()));
        }
        if self.migration.batch_size == 0 {
            return Err(VaultError::Config("migration.batch_size must be positive".into()));
        }
        if self.migration.sort_field.is_empty() {
            return Err(VaultError::Config("migration.sort_field must be set".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.pbkdf2_iterations, 600_000);
        assert_eq!(config.migration.page_size, 100);
        assert_eq!(config.migration.batch_size, 50);
        assert!(config.silent_migration);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config =
            VaultConfig::from_json(r#"{"silent_migration": false, "migration": {"batch_size": 10}}"#)
                .unwrap();
        assert!(!config.silent_migration);
        assert_eq!(config.migration.batch_size, 10);
        assert_eq!(config.migration.page_size, 100);
        assert_eq!(config.pbkdf2_iterations, 600_000);
    }

    #[test]
    fn test_rejects_zero_sizes() {
        assert!(VaultConfig::from_json(r#"{"pbkdf2_iterations": 0}"#).is_err());
        assert!(VaultConfig::from_json(r#"{"migration": {"page_size": 0}}"#).is_err());
        assert!(VaultConfig::default().validate().is_ok());
    }
}
