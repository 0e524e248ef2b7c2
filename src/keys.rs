//! Key types and the session-token key.
//!
//! This module owns two responsibilities:
//! 1. Holding key material in types that are opaque, non-cloneable,
//!    redacted in `Debug`, and zeroised on drop.
//! 2. Turning a session token into a wrapping key. The token is already a
//!    full-entropy 256-bit value, so its raw bytes are used as the AES key
//!    directly. PBKDF2 is reserved for passwords (see `crypto`).
//!
//! Raw key bytes are `pub(crate)`; only `crypto` reads them.
//!
//! ## Hierarchy
//!
//! ```text
//! password --PBKDF2(salt, iterations)--> WrappingKey --wraps--> DataKey
//! SessionToken ---------(raw bytes)----> WrappingKey --wraps--> DataKey
//! DataKey --AES-256-GCM--> record fields
//! ```

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{self, KEY_LEN};
use crate::error::CryptoError;

/// PBKDF2 iteration count for newly wrapped keys.
///
/// Accounts store the count they were wrapped with; raising this constant
/// only affects keys wrapped afterwards.
pub const CURRENT_PBKDF2_ITERATIONS: u32 = 600_000;

/// Iteration count assumed for accounts whose record predates per-account
/// iteration storage.
pub const LEGACY_PBKDF2_ITERATIONS: u32 = 600_000;

// ---------------------------------------------------------------------------
// Data key
// ---------------------------------------------------------------------------

/// The per-user Data Encryption Key.
///
/// - Not `Clone`. Shared read-only for a session through `Arc<DataKey>`.
/// - Zeroised on drop.
/// - Raw bytes never leave the crate.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DataKey {
    bytes: [u8; KEY_LEN],
}

impl DataKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// `pub(crate)`: raw bytes never leave the crate.
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Constant-time equality, for convergence checks without exposing
    /// the bytes.
    pub fn same_key_as(&self, other: &DataKey) -> bool {
        self.bytes[..].ct_eq(&other.bytes[..]).unwrap_u8() == 1
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Wrapping key
// ---------------------------------------------------------------------------

/// A key-encryption key: password-derived or session-token-derived.
///
/// Lives only for the duration of a wrap or unwrap.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct WrappingKey {
    bytes: [u8; KEY_LEN],
}

impl WrappingKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for WrappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WrappingKey(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Session token
// ---------------------------------------------------------------------------

/// A random 256-bit token that wraps the DEK for the lifetime of a local
/// session. Never sent to the server.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionToken {
    bytes: [u8; KEY_LEN],
}

impl SessionToken {
    /// Generate a fresh token from the system CSPRNG.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; KEY_LEN];
        crypto::fill_random(&mut bytes)?;
        Ok(Self { bytes })
    }

    /// Parse a token from its persisted base64 form.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let mut raw = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidKey)?;
        let result = <[u8; KEY_LEN]>::try_from(raw.as_slice())
            .map(|bytes| Self { bytes })
            .map_err(|_| CryptoError::InvalidKey);
        raw.zeroize();
        result
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    /// The wrapping key for the session cache: the token bytes themselves.
    pub fn wrapping_key(&self) -> WrappingKey {
        WrappingKey::from_bytes(self.bytes)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// KDF parameters
// ---------------------------------------------------------------------------

/// PBKDF2 parameters persisted alongside a wrapped DEK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub salt: Vec<u8>,
    pub iterations: u32,
}

impl KdfParams {
    /// Fresh random salt with the given iteration count.
    pub fn generate(iterations: u32) -> Result<Self, CryptoError> {
        Ok(Self {
            salt: crypto::generate_salt()?,
            iterations,
        })
    }

    /// Parse a base64 salt as stored on the auth record.
    pub fn from_base64(salt: &str, iterations: u32) -> Result<Self, CryptoError> {
        let salt = STANDARD
            .decode(salt.trim())
            .map_err(|_| CryptoError::KeyDerivationFailure)?;
        Ok(Self { salt, iterations })
    }

    pub fn salt_base64(&self) -> String {
        STANDARD.encode(&self.salt)
    }

    /// Derive the password wrapping key for these parameters.
    pub fn derive(&self, password: &str) -> Result<WrappingKey, CryptoError> {
        crypto::derive_key_from_password(password, &self.salt, self.iterations)
    }
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Narrow capability handed to anything that needs the session DEK.
///
/// `None` means "not unlocked": callers must prompt for the password,
/// never treat it as fatal.
pub trait KeyProvider {
    fn data_key(&self) -> Option<Arc<DataKey>>;
}

impl KeyProvider for Option<Arc<DataKey>> {
    fn data_key(&self) -> Option<Arc<DataKey>> {
        self.clone()
    }
}
