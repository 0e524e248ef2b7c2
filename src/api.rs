//! The network collaborator.
//!
//! Transport, bearer tokens and the CRUD handlers live behind this trait.
//! The engine only needs authentication, paginated raw reads, bulk writes,
//! and the handful of auth-record updates listed here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::account::{AuthRecord, KeyMaterial};
use crate::error::ApiError;
use crate::status::EncryptionStatus;

/// A raw record as stored: sensitive fields may be ciphertext or plaintext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// One page of a collection listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub records: Vec<Record>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Sort order for paginated listings. Must be stable across pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }
}

/// `{id, data}` as accepted by the bulk-update endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordUpdate {
    pub id: String,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Result of a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authenticated {
    pub bearer_token: String,
    pub auth_record: AuthRecord,
}

/// Authenticated REST surface consumed by the engine.
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// Exchange credentials for a bearer token and the auth record.
    /// Wrong email and wrong password must be indistinguishable.
    async fn authenticate(&self, email: &str, password: &str) -> Result<Authenticated, ApiError>;

    /// Fetch one page (1-based) of raw records.
    async fn fetch_page(
        &self,
        collection: &str,
        page: u32,
        page_size: u32,
        sort: &Sort,
    ) -> Result<Page, ApiError>;

    /// Apply `{id, data}` updates in one request.
    async fn bulk_update(
        &self,
        collection: &str,
        updates: Vec<RecordUpdate>,
    ) -> Result<BulkUpdateResult, ApiError>;

    /// Store the wrapped DEK for an account that has none, and return the
    /// server's auth record afterwards.
    ///
    /// If the account already has key material, the server must keep it.
    /// The returned record then carries the existing material and the
    /// server's current status.
    async fn setup_encryption(&self, candidate: KeyMaterial) -> Result<AuthRecord, ApiError>;

    /// Replace the wrapped DEK after a password change. The DEK is the same.
    async fn update_key_material(&self, material: KeyMaterial) -> Result<(), ApiError>;

    async fn persist_encryption_status(&self, status: EncryptionStatus) -> Result<(), ApiError>;
}
