//! # fieldvault
//!
//! Client-side envelope encryption for per-user record fields.
//!
//! Each account has one Data Encryption Key (DEK). The server stores it
//! only wrapped under a password-derived key; the client keeps it wrapped
//! under a random session token between page loads. Sensitive record
//! fields are sealed with AES-256-GCM before they leave the client, so the
//! server never sees plaintext. Accounts that predate encryption are
//! brought under the scheme by a resumable migration run.
//!
//! ## Public API
//!
//! [`Vault`] is the entry point for the UI layer. The lower layers
//! ([`crypto`], [`hierarchy`], [`codec`], [`migration`]) are public for
//! hosts that need to compose them differently.

pub mod account;
pub mod api;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod entity;
pub mod error;
pub mod hierarchy;
pub mod keys;
pub mod migration;
pub mod status;
pub mod store;
pub mod vault;

pub use account::{AuthRecord, KeyMaterial};
pub use api::{Authenticated, BulkUpdateResult, Page, Record, RecordUpdate, Sort, VaultApi};
pub use config::{MigrationConfig, VaultConfig};
pub use entity::{Bookmark, Encryptable, EntityKind, JobApplication, Note, Placeholder, TextTemplate};
pub use error::{
    ApiError, AuthError, CryptoError, MigrationRecordError, Result, StoreError, VaultError,
};
pub use hierarchy::{KeyHierarchy, SessionCacheEntry};
pub use keys::{DataKey, KeyProvider};
pub use migration::{CollectionReport, MigrationEngine, MigrationReport};
pub use status::EncryptionStatus;
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use vault::Vault;

/// Generate a new random DEK.
///
/// Normally the vault does this itself when an account is secured. In
/// production, a DEK is created once per account and never rotated.
pub fn generate_dek() -> Result<DataKey> {
    Ok(crypto::generate_key()?)
}
