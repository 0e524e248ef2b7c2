//! Key hierarchy: password, DEK and session cache.
//!
//! The password is only ever used to unwrap (or wrap) the DEK. As soon as
//! the DEK is in memory it is re-wrapped under a fresh random session
//! token, and both the password and the password-derived key go out of
//! scope. Later page loads recover the DEK from the session cache without
//! the password.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::account::{AuthRecord, KeyMaterial};
use crate::crypto;
use crate::error::{AuthError, Result, VaultError};
use crate::keys::{DataKey, KdfParams, KeyProvider, SessionToken};
use crate::store::{KeyValueStore, SESSION_TOKEN_KEY, WRAPPED_DEK_FOR_SESSION_KEY};

/// Unwrap the account DEK with the password.
///
/// Only fails on missing or malformed key material, or when the
/// password-derived key does not open the wrapped DEK. The latter is
/// indistinguishable from corruption under AES-GCM.
pub fn unlock(password: &str, record: &AuthRecord) -> Result<DataKey> {
    let material = record
        .key_material()
        .ok_or_else(|| VaultError::InvalidAuthRecord("account has no wrapped DEK".into()))?;
    unlock_material(password, &material)
}

/// Unwrap a DEK from a key bundle with the password.
pub fn unlock_material(password: &str, material: &KeyMaterial) -> Result<DataKey> {
    let params = material.kdf_params()?;
    let password_key = params.derive(password)?;
    let dek = crypto::unwrap_key(&material.wrapped_dek, &password_key)?;
    // password_key is zeroised here.
    Ok(dek)
}

/// Wrap an existing DEK under a new password with a freshly generated salt.
pub fn rewrap_for_password(dek: &DataKey, password: &str, iterations: u32) -> Result<KeyMaterial> {
    let params = KdfParams::generate(iterations)?;
    let password_key = params.derive(password)?;
    Ok(KeyMaterial {
        wrapped_dek: crypto::wrap_key(dek, &password_key)?,
        password_key_salt: params.salt_base64(),
        pbkdf2_iterations: params.iterations,
    })
}

/// Generate a brand-new DEK and wrap it under the password.
pub fn provision(password: &str, iterations: u32) -> Result<(DataKey, KeyMaterial)> {
    let dek = crypto::generate_key()?;
    let material = rewrap_for_password(&dek, password, iterations)?;
    Ok((dek, material))
}

/// The two persisted values of the session cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCacheEntry {
    pub session_token: String,
    #[serde(rename = "wrappedDEKForSession")]
    pub wrapped_dek_for_session: String,
}

/// Holds the in-memory DEK and manages its session-wrapped copy.
pub struct KeyHierarchy<S: KeyValueStore> {
    store: Arc<S>,
    current: RwLock<Option<Arc<DataKey>>>,
}

impl<S: KeyValueStore> KeyHierarchy<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Make `dek` the session key and persist a session-wrapped copy.
    pub fn install(&self, dek: DataKey) -> Result<(Arc<DataKey>, SessionCacheEntry)> {
        let entry = self.cache_for_session(&dek)?;
        let dek = Arc::new(dek);
        *self.current.write() = Some(Arc::clone(&dek));
        Ok((dek, entry))
    }

    /// Wrap the DEK under a fresh session token and persist both values.
    pub fn cache_for_session(&self, dek: &DataKey) -> Result<SessionCacheEntry> {
        let token = SessionToken::generate()?;
        let wrapped = crypto::wrap_key(dek, &token.wrapping_key())?;
        let entry = SessionCacheEntry {
            session_token: token.to_base64(),
            wrapped_dek_for_session: wrapped,
        };

        self.store.set(SESSION_TOKEN_KEY, &entry.session_token)?;
        self.store
            .set(WRAPPED_DEK_FOR_SESSION_KEY, &entry.wrapped_dek_for_session)?;
        debug!("cached DEK under a new session token");
        Ok(entry)
    }

    /// Recover the DEK from the session cache.
    ///
    /// Returns `None` when either value is missing. A cache that fails to
    /// unwrap is deleted and also reported as `None`.
    pub fn cached_key(&self) -> Option<Arc<DataKey>> {
        match self.load_cached() {
            Ok(found) => found.map(Arc::new),
            Err(e) => {
                warn!(error = %e, "discarding unusable session key cache");
                self.clear_session_cache();
                None
            }
        }
    }

    fn load_cached(&self) -> Result<Option<DataKey>> {
        let token = self.store.get(SESSION_TOKEN_KEY)?;
        let wrapped = self.store.get(WRAPPED_DEK_FOR_SESSION_KEY)?;
        let (Some(token), Some(wrapped)) = (token, wrapped) else {
            return Ok(None);
        };

        let token = SessionToken::from_base64(&token).map_err(|_| VaultError::CacheCorruption)?;
        crypto::unwrap_key(&wrapped, &token.wrapping_key())
            .map(Some)
            .map_err(|_| VaultError::CacheCorruption)
    }

    /// The DEK for this session: in memory first, then the session cache.
    pub fn current_key(&self) -> Option<Arc<DataKey>> {
        if let Some(dek) = self.current.read().as_ref() {
            return Some(Arc::clone(dek));
        }
        let dek = self.cached_key()?;
        *self.current.write() = Some(Arc::clone(&dek));
        Some(dek)
    }

    /// Like [`Self::current_key`] but an error when locked.
    pub fn require_key(&self) -> std::result::Result<Arc<DataKey>, AuthError> {
        self.current_key().ok_or(AuthError::Locked)
    }

    /// Delete both session cache values. Storage errors are logged; the
    /// caller is already on a recovery path.
    pub fn clear_session_cache(&self) {
        for key in [SESSION_TOKEN_KEY, WRAPPED_DEK_FOR_SESSION_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!(error = %e, key, "failed to remove session cache entry");
            }
        }
    }

    /// Drop the in-memory DEK. Persisted state is untouched.
    pub fn forget(&self) {
        self.current.write().take();
    }
}

impl<S: KeyValueStore> KeyProvider for KeyHierarchy<S> {
    fn data_key(&self) -> Option<Arc<DataKey>> {
        self.current_key()
    }
}
