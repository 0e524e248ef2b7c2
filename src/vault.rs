//! The public facade used by the UI layer.
//!
//! `Vault` ties together the network collaborator, local storage, the key
//! hierarchy and the account's encryption status:
//! 1. `login` / `unlock_session` turn a password into a session DEK.
//! 2. `encrypt_for_write` / `decrypt_for_read` route records through the
//!    field codec.
//! 3. `run_migration` seals historical plaintext and, on full success,
//!    marks the account `ENCRYPTED`.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::account::{AuthRecord, KeyMaterial};
use crate::api::{Record, VaultApi};
use crate::config::VaultConfig;
use crate::entity::{self, Encryptable, EntityKind};
use crate::error::{ApiError, AuthError, Result, VaultError};
use crate::hierarchy::{self, KeyHierarchy};
use crate::keys::{DataKey, KeyProvider};
use crate::migration::{MigrationEngine, MigrationReport};
use crate::status::EncryptionStatus;
use crate::store::{KeyValueStore, BEARER_TOKEN_KEY};

/// A password-wrapped DEK that does not open reads as bad credentials.
fn bad_credentials(e: VaultError) -> VaultError {
    match e {
        VaultError::Crypto(_) => AuthError::InvalidCredentials.into(),
        other => other,
    }
}

/// Client-side encryption state for one signed-in user.
pub struct Vault<A: VaultApi, S: KeyValueStore> {
    api: Arc<A>,
    config: VaultConfig,
    keys: KeyHierarchy<S>,
    record: RwLock<Option<AuthRecord>>,
}

impl<A: VaultApi, S: KeyValueStore> Vault<A, S> {
    pub fn new(api: Arc<A>, store: Arc<S>, config: VaultConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            api,
            config,
            keys: KeyHierarchy::new(store),
            record: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeyHierarchy<S> {
        &self.keys
    }

    /// Snapshot of the current auth record, if signed in.
    pub fn auth_record(&self) -> Option<AuthRecord> {
        self.record.read().clone()
    }

    /// The account's status. `UNENCRYPTED` when nobody is signed in.
    pub fn current_status(&self) -> EncryptionStatus {
        self.record
            .read()
            .as_ref()
            .map(|r| r.encryption_status)
            .unwrap_or_default()
    }

    /// True when a DEK is available for this session.
    pub fn is_unlocked(&self) -> bool {
        self.keys.current_key().is_some()
    }

    /// Adopt an auth record obtained elsewhere (e.g. a restored session).
    pub fn set_auth_record(&self, record: AuthRecord) -> Result<()> {
        record.validate()?;
        *self.record.write() = Some(record);
        Ok(())
    }

    fn require_record(&self) -> std::result::Result<AuthRecord, AuthError> {
        self.auth_record().ok_or(AuthError::NotAuthenticated)
    }

    fn update_record(&self, f: impl FnOnce(&mut AuthRecord)) {
        if let Some(record) = self.record.write().as_mut() {
            f(record);
        }
    }

    // ── Session ──

    /// Authenticate and unlock the DEK. The bearer token and the auth
    /// record are kept only when the unlock succeeds.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let authenticated = self
            .api
            .authenticate(email, password)
            .await
            .map_err(|e| match e {
                ApiError::Unauthorized | ApiError::Rejected { status: 401, .. } => {
                    VaultError::Auth(AuthError::InvalidCredentials)
                }
                other => VaultError::Api(other),
            })?;

        self.set_auth_record(authenticated.auth_record)?;
        if let Err(e) = self.unlock_session(password).await {
            self.record.write().take();
            return Err(e);
        }
        self.keys
            .store()
            .set(BEARER_TOKEN_KEY, &authenticated.bearer_token)?;
        Ok(())
    }

    /// Turn the password into a session DEK.
    ///
    /// Legacy accounts get a DEK here when silent migration is enabled;
    /// otherwise they stay keyless until `secure_account`.
    pub async fn unlock_session(&self, password: &str) -> Result<()> {
        let record = self.require_record()?;

        if record.key_material().is_some() {
            let dek = hierarchy::unlock(password, &record).map_err(bad_credentials)?;
            self.keys.install(dek)?;
            debug!(user = %record.user_id, "session unlocked");
            return Ok(());
        }

        if self.config.silent_migration {
            info!(user = %record.user_id, "creating DEK for legacy account at login");
            self.secure_account(password).await?;
        }
        Ok(())
    }

    /// Recover the DEK from the session cache without a password.
    ///
    /// `false` means the user must unlock again.
    pub fn restore_session(&self) -> bool {
        self.keys.current_key().is_some()
    }

    /// Clear all local state and forget the DEK.
    pub fn logout(&self) -> Result<()> {
        self.keys.forget();
        self.keys.store().clear()?;
        self.record.write().take();
        debug!("logged out");
        Ok(())
    }

    // ── Key setup ──

    /// `UNENCRYPTED -> MIGRATED`: give the account a DEK.
    ///
    /// If the account already has one, it is unlocked instead. If another
    /// client created one concurrently, the server keeps its copy and this
    /// client converges on it.
    pub async fn secure_account(&self, password: &str) -> Result<()> {
        let record = self.require_record()?;

        // The status the server holds, as far as this client knows.
        let (material, server_status) = match record.key_material() {
            Some(existing) => (existing, record.encryption_status),
            None => {
                let (candidate_dek, candidate) =
                    hierarchy::provision(password, self.config.pbkdf2_iterations)?;
                let server = self.api.setup_encryption(candidate.clone()).await?;
                server.validate()?;
                let stored = server.key_material().ok_or_else(|| {
                    VaultError::InvalidAuthRecord("setup returned no wrapped DEK".into())
                })?;
                if stored != candidate {
                    warn!(user = %record.user_id, "server already had a DEK; adopting it");
                }
                drop(candidate_dek);
                (stored, server.encryption_status)
            }
        };

        let dek = hierarchy::unlock_material(password, &material).map_err(bad_credentials)?;

        // Only ever persist a status ahead of the server's.
        let status = if server_status.needs_key_setup() {
            server_status.transition(EncryptionStatus::Migrated)?
        } else {
            server_status
        };
        if status > server_status {
            self.api.persist_encryption_status(status).await?;
        }

        self.update_record(|r| {
            r.set_key_material(&material);
            r.encryption_status = status;
        });
        self.keys.install(dek)?;
        info!(user = %record.user_id, %status, "account secured");
        Ok(())
    }

    /// Re-wrap the same DEK under a new password with a fresh salt.
    ///
    /// The session cache depends only on the session token, so open
    /// sessions keep working.
    pub async fn change_password(&self, current: &str, new: &str) -> Result<()> {
        let record = self.require_record()?;
        let dek = hierarchy::unlock(current, &record).map_err(bad_credentials)?;

        let material: KeyMaterial =
            hierarchy::rewrap_for_password(&dek, new, self.config.pbkdf2_iterations)?;
        self.api.update_key_material(material.clone()).await?;
        self.update_record(|r| r.set_key_material(&material));
        info!(user = %record.user_id, "password key rotated");
        Ok(())
    }

    // ── Records ──

    /// The key to write with, or `None` for a legacy account that stores
    /// plaintext. A keyed account that is locked is an error.
    fn write_key(&self) -> Result<Option<Arc<DataKey>>> {
        match self.keys.current_key() {
            Some(dek) => Ok(Some(dek)),
            None if self.current_status().has_key() => Err(AuthError::Locked.into()),
            None => Ok(None),
        }
    }

    pub fn encrypt_for_write<T: Encryptable>(&self, entity: &T) -> Result<T> {
        match self.write_key()? {
            Some(dek) => entity::encrypt_entity(entity, &dek),
            None => Ok(serde_json::from_value(serde_json::to_value(entity)?)?),
        }
    }

    pub fn decrypt_for_read<T: Encryptable>(&self, entity: &T) -> Result<T> {
        let dek = self.keys.data_key();
        entity::decrypt_entity(entity, dek.as_deref())
    }

    pub fn encrypt_record(&self, kind: EntityKind, record: &mut Record) -> Result<()> {
        if let Some(dek) = self.write_key()? {
            entity::encrypt_record(kind, record, &dek)?;
        }
        Ok(())
    }

    pub fn decrypt_record(&self, kind: EntityKind, record: &mut Record) {
        let dek = self.keys.data_key();
        entity::decrypt_record(kind, record, dek.as_deref());
    }

    // ── Migration ──

    /// Seal all historical plaintext. On aggregate success a `MIGRATED`
    /// account becomes `ENCRYPTED`.
    pub async fn run_migration(&self) -> Result<MigrationReport> {
        let status = self.current_status();
        if status.needs_key_setup() {
            return Err(VaultError::InvalidTransition {
                from: status,
                to: EncryptionStatus::Encrypted,
            });
        }
        let dek = self.keys.require_key()?;

        let engine = MigrationEngine::new(self.api.as_ref(), &self.config.migration, &dek);
        let report = engine.run(&EntityKind::ALL).await;

        if report.success {
            let next = status.transition(EncryptionStatus::Encrypted)?;
            if next != status {
                self.api.persist_encryption_status(next).await?;
                self.update_record(|r| r.encryption_status = next);
                info!(%next, "migration complete");
            }
        } else {
            warn!(
                failed = report.failed(),
                "migration finished with failures; status unchanged"
            );
        }
        Ok(report)
    }

    /// Report what a migration would do without writing.
    pub async fn scan_migration(&self) -> Result<MigrationReport> {
        let dek = self.keys.require_key()?;
        let engine = MigrationEngine::new(self.api.as_ref(), &self.config.migration, &dek);
        Ok(engine.scan(&EntityKind::ALL).await)
    }
}
