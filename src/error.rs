//! Error types for fieldvault.
//!
//! Crypto errors are intentionally minimal: they signal *what* failed
//! without revealing *why* in ways that could leak cryptographic state.
//! A wrong key and a tampered envelope produce the same
//! [`CryptoError::DecryptionFailure`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::EncryptionStatus;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Failures of the primitive crypto layer. Always fail-closed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Key bytes had the wrong length or could not be bound to the cipher.
    #[error("invalid key")]
    InvalidKey,

    /// The input is not a well-formed envelope (bad base64, too short).
    #[error("malformed envelope")]
    MalformedEnvelope,

    /// Authentication failed: wrong key, tampered ciphertext or corrupted tag.
    #[error("decryption failed")]
    DecryptionFailure,

    #[error("encryption failed")]
    EncryptionFailure,

    /// PBKDF2 parameters were unusable (zero iterations, empty salt).
    #[error("key derivation failed")]
    KeyDerivationFailure,

    #[error("randomness source failed")]
    RandomnessFailure,
}

/// Authentication and unlock failures surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Wrong email or password. Never says which.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// No authenticated account snapshot is available.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The account has a DEK but it is not unlocked in this session.
    #[error("encryption key is locked; unlock with your password")]
    Locked,
}

/// Failures reported by the network collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unauthorized")]
    Unauthorized,
}

/// Failures of the local key-value storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One record (or one record's batch) that could not be re-encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecordError {
    pub id: String,
    pub message: String,
}

/// The crate-level error type.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The session cache could not be unwrapped. Handled by clearing the
    /// cache; never surfaced past the key hierarchy.
    #[error("session key cache is corrupted")]
    CacheCorruption,

    #[error("invalid auth record: {0}")]
    InvalidAuthRecord(String),

    #[error("invalid encryption status transition: {from} -> {to}")]
    InvalidTransition {
        from: EncryptionStatus,
        to: EncryptionStatus,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}
