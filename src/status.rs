//! Per-account encryption status.
//!
//! ```text
//! UNENCRYPTED --(DEK created)--> MIGRATED --(all records sealed)--> ENCRYPTED
//! ```
//!
//! Transitions only move forward. A fresh DEK cannot decrypt data sealed
//! under a previous one, so there is no downgrade path.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::{Result, VaultError};

/// The three account generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncryptionStatus {
    /// Legacy account. No DEK exists.
    #[default]
    Unencrypted,
    /// A DEK exists and is wrapped under the password, but historical
    /// records may still hold plaintext.
    Migrated,
    /// Every record has been sealed under the DEK at least once.
    Encrypted,
}

impl EncryptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unencrypted => "UNENCRYPTED",
            Self::Migrated => "MIGRATED",
            Self::Encrypted => "ENCRYPTED",
        }
    }

    /// Normalize the wire value. Absent and unknown values are both
    /// `Unencrypted`.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::Unencrypted,
            Some(s) if s.eq_ignore_ascii_case("UNENCRYPTED") => Self::Unencrypted,
            Some(s) if s.eq_ignore_ascii_case("MIGRATED") => Self::Migrated,
            Some(s) if s.eq_ignore_ascii_case("ENCRYPTED") => Self::Encrypted,
            Some(other) => {
                warn!(status = other, "unknown encryption status, treating as UNENCRYPTED");
                Self::Unencrypted
            }
        }
    }

    /// True when the account has a DEK.
    pub fn has_key(&self) -> bool {
        !matches!(self, Self::Unencrypted)
    }

    /// The UI must offer key setup ("secure my account").
    pub fn needs_key_setup(&self) -> bool {
        matches!(self, Self::Unencrypted)
    }

    /// Historical records may still hold plaintext.
    pub fn needs_migration(&self) -> bool {
        matches!(self, Self::Unencrypted | Self::Migrated)
    }

    /// Validate a move to `to`. Same-state moves are no-ops.
    pub fn transition(self, to: EncryptionStatus) -> Result<EncryptionStatus> {
        use EncryptionStatus::*;
        match (self, to) {
            (from, to) if from == to => Ok(to),
            (Unencrypted, Migrated) | (Migrated, Encrypted) => Ok(to),
            (from, to) => Err(VaultError::InvalidTransition { from, to }),
        }
    }
}

impl fmt::Display for EncryptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EncryptionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(Self::from_wire(raw.as_deref()))
    }
}
