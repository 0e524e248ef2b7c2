//! The server-held auth record and its wrapped key material.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};
use crate::keys::{KdfParams, LEGACY_PBKDF2_ITERATIONS};
use crate::status::EncryptionStatus;

/// The DEK wrapped under the password, plus what is needed to re-derive
/// the password key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMaterial {
    #[serde(rename = "wrappedDEK")]
    pub wrapped_dek: String,
    pub password_key_salt: String,
    pub pbkdf2_iterations: u32,
}

impl KeyMaterial {
    pub fn kdf_params(&self) -> Result<KdfParams> {
        Ok(KdfParams::from_base64(
            &self.password_key_salt,
            self.pbkdf2_iterations,
        )?)
    }
}

/// Snapshot of the server's per-user auth record, as returned at login.
///
/// Password hashing for authentication is separate and not represented.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRecord {
    pub user_id: String,
    #[serde(default)]
    pub password_key_salt: Option<String>,
    #[serde(default, rename = "wrappedDEK")]
    pub wrapped_dek: Option<String>,
    /// Absent on records written before iteration counts were stored.
    #[serde(default)]
    pub pbkdf2_iterations: Option<u32>,
    #[serde(default)]
    pub encryption_status: EncryptionStatus,
}

impl AuthRecord {
    /// A fresh account with no DEK.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Check the record's invariants.
    ///
    /// - salt and wrapped DEK are both present or both absent;
    /// - any status past `UNENCRYPTED` requires both.
    pub fn validate(&self) -> Result<()> {
        let has_salt = self.password_key_salt.as_deref().is_some_and(|s| !s.is_empty());
        let has_dek = self.wrapped_dek.as_deref().is_some_and(|s| !s.is_empty());

        if has_salt != has_dek {
            return Err(VaultError::InvalidAuthRecord(
                "wrappedDEK and passwordKeySalt must be set together".into(),
            ));
        }
        if self.encryption_status.has_key() && !has_dek {
            return Err(VaultError::InvalidAuthRecord(format!(
                "status {} requires a wrapped DEK",
                self.encryption_status
            )));
        }
        if self.pbkdf2_iterations == Some(0) {
            return Err(VaultError::InvalidAuthRecord(
                "pbkdf2Iterations must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The wrapped key bundle, if the account has a DEK.
    pub fn key_material(&self) -> Option<KeyMaterial> {
        match (&self.wrapped_dek, &self.password_key_salt) {
            (Some(dek), Some(salt)) if !dek.is_empty() && !salt.is_empty() => Some(KeyMaterial {
                wrapped_dek: dek.clone(),
                password_key_salt: salt.clone(),
                pbkdf2_iterations: self.pbkdf2_iterations.unwrap_or(LEGACY_PBKDF2_ITERATIONS),
            }),
            _ => None,
        }
    }

    /// Replace the key bundle (at migration or password change).
    pub fn set_key_material(&mut self, material: &KeyMaterial) {
        self.wrapped_dek = Some(material.wrapped_dek.clone());
        self.password_key_salt = Some(material.password_key_salt.clone());
        self.pbkdf2_iterations = Some(material.pbkdf2_iterations);
    }
}
