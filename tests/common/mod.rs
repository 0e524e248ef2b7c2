//! Shared fixtures: an in-memory backend that behaves like the REST API.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use fieldvault::{
    ApiError, Authenticated, AuthRecord, BulkUpdateResult, EncryptionStatus, KeyMaterial,
    MemoryStore, Page, Record, RecordUpdate, Sort, Vault, VaultApi, VaultConfig,
};

pub const EMAIL: &str = "ada@example.com";
pub const PASSWORD: &str = "correct horse battery staple";

/// Low iteration count keeps tests fast; small pages exercise pagination.
pub fn test_config() -> VaultConfig {
    let mut config = VaultConfig::default();
    config.pbkdf2_iterations = 1_000;
    config.migration.page_size = 10;
    config.migration.batch_size = 4;
    config
}

#[derive(Default)]
struct State {
    account: AuthRecord,
    // Records per collection, ordered by id.
    collections: HashMap<String, BTreeMap<String, Map<String, Value>>>,
    failing_bulk_collections: HashSet<String>,
    failing_fetch_collections: HashSet<String>,
    fail_next_bulk_updates: usize,
    bulk_calls: usize,
    page_requests: Vec<(String, u32)>,
    setup_calls: usize,
}

/// Single-user backend. Sorting is always by id, ascending.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        backend.state.lock().unwrap().account = AuthRecord::new("user-1");
        Arc::new(backend)
    }

    pub fn insert(&self, collection: &str, id: &str, fields: Value) {
        let Value::Object(map) = fields else {
            panic!("fields must be a JSON object");
        };
        self.state
            .lock()
            .unwrap()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), map);
    }

    pub fn stored(&self, collection: &str, id: &str) -> Map<String, Value> {
        self.state.lock().unwrap().collections[collection][id].clone()
    }

    pub fn stored_str(&self, collection: &str, id: &str, field: &str) -> String {
        self.stored(collection, id)[field]
            .as_str()
            .unwrap()
            .to_string()
    }

    pub fn account(&self) -> AuthRecord {
        self.state.lock().unwrap().account.clone()
    }

    pub fn set_account(&self, account: AuthRecord) {
        self.state.lock().unwrap().account = account;
    }

    pub fn fail_bulk_for(&self, collection: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_bulk_collections
            .insert(collection.to_string());
    }

    pub fn fail_fetch_for(&self, collection: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_fetch_collections
            .insert(collection.to_string());
    }

    pub fn fail_next_bulk_updates(&self, count: usize) {
        self.state.lock().unwrap().fail_next_bulk_updates = count;
    }

    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.failing_bulk_collections.clear();
        state.failing_fetch_collections.clear();
        state.fail_next_bulk_updates = 0;
    }

    pub fn bulk_calls(&self) -> usize {
        self.state.lock().unwrap().bulk_calls
    }

    pub fn page_requests(&self) -> Vec<(String, u32)> {
        self.state.lock().unwrap().page_requests.clone()
    }

    pub fn setup_calls(&self) -> usize {
        self.state.lock().unwrap().setup_calls
    }
}

#[async_trait]
impl VaultApi for MemoryBackend {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Authenticated, ApiError> {
        if email != EMAIL || password != PASSWORD {
            return Err(ApiError::Unauthorized);
        }
        Ok(Authenticated {
            bearer_token: "bearer-token-1".to_string(),
            auth_record: self.account(),
        })
    }

    async fn fetch_page(
        &self,
        collection: &str,
        page: u32,
        page_size: u32,
        _sort: &Sort,
    ) -> Result<Page, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.page_requests.push((collection.to_string(), page));
        if state.failing_fetch_collections.contains(collection) {
            return Err(ApiError::Transport("connection reset".into()));
        }

        let Some(records) = state.collections.get(collection) else {
            return Ok(Page::default());
        };
        let start = (page.saturating_sub(1) * page_size) as usize;
        let records: Vec<Record> = records
            .iter()
            .skip(start)
            .take(page_size as usize)
            .map(|(id, fields)| Record::new(id.clone(), fields.clone()))
            .collect();
        let has_more = start + records.len() < state.collections[collection].len();
        Ok(Page { records, has_more })
    }

    async fn bulk_update(
        &self,
        collection: &str,
        updates: Vec<RecordUpdate>,
    ) -> Result<BulkUpdateResult, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.bulk_calls += 1;
        if state.fail_next_bulk_updates > 0 {
            state.fail_next_bulk_updates -= 1;
            return Err(ApiError::Rejected {
                status: 503,
                message: "temporarily unavailable".into(),
            });
        }
        if state.failing_bulk_collections.contains(collection) {
            return Err(ApiError::Rejected {
                status: 500,
                message: "bulk write failed".into(),
            });
        }

        let records = state.collections.entry(collection.to_string()).or_default();
        let mut result = BulkUpdateResult::default();
        for update in updates {
            if let Some(existing) = records.get_mut(&update.id) {
                result.matched_count += 1;
                for (field, value) in update.data {
                    existing.insert(field, value);
                }
                result.modified_count += 1;
            }
        }
        Ok(result)
    }

    async fn setup_encryption(&self, candidate: KeyMaterial) -> Result<AuthRecord, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.setup_calls += 1;
        // First writer wins. The status is left for the client to persist.
        if state.account.key_material().is_none() {
            state.account.set_key_material(&candidate);
        }
        Ok(state.account.clone())
    }

    async fn update_key_material(&self, material: KeyMaterial) -> Result<(), ApiError> {
        self.state.lock().unwrap().account.set_key_material(&material);
        Ok(())
    }

    async fn persist_encryption_status(&self, status: EncryptionStatus) -> Result<(), ApiError> {
        self.state.lock().unwrap().account.encryption_status = status;
        Ok(())
    }
}

pub type TestVault = Vault<MemoryBackend, MemoryStore>;

pub fn vault(backend: &Arc<MemoryBackend>) -> (TestVault, Arc<MemoryStore>) {
    vault_with(backend, test_config())
}

pub fn vault_with(backend: &Arc<MemoryBackend>, config: VaultConfig) -> (TestVault, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let vault = Vault::new(Arc::clone(backend), Arc::clone(&store), config).unwrap();
    (vault, store)
}

/// A backend whose account is already secured, and a vault logged into it.
pub async fn secured() -> (Arc<MemoryBackend>, TestVault, Arc<MemoryStore>) {
    let backend = MemoryBackend::new();
    let (vault, store) = vault(&backend);
    vault.login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(vault.current_status(), EncryptionStatus::Migrated);
    (backend, vault, store)
}
