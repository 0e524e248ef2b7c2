//! Bulk migration of historical plaintext into envelopes.
//!
//! Walks every collection page by page, finds sensitive fields that still
//! hold plaintext, seals them under the DEK, and writes them back through
//! the bulk-update endpoint.
//!
//! Ordering:
//! 1. Collections are processed one after another.
//! 2. Within a collection, page N+1 is not requested until every batch
//!    for page N has been sent.
//!
//! A failed batch marks its records failed and the run carries on. A
//! collection that fails outright (e.g. a page fetch error) is reported on
//! its own and the next collection still runs. Re-running picks up
//! whatever is still plaintext; records already sealed are skipped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tracing::{debug, info, warn};

use crate::api::{Record, RecordUpdate, VaultApi};
use crate::codec;
use crate::config::MigrationConfig;
use crate::entity::EntityKind;
use crate::error::{MigrationRecordError, Result};
use crate::keys::DataKey;

/// Outcome for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionReport {
    pub collection: String,
    /// Records seen.
    pub total: usize,
    /// Records sealed and written during this run.
    pub newly_encrypted: usize,
    /// Records with no plaintext left in any sensitive field.
    pub already_encrypted: usize,
    /// Records that still need work (dry runs only).
    pub pending: usize,
    pub failed: usize,
    pub errors: Vec<MigrationRecordError>,
    /// Set when the collection could not be processed to the end.
    pub error: Option<String>,
}

impl CollectionReport {
    fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            total: 0,
            newly_encrypted: 0,
            already_encrypted: 0,
            pending: 0,
            failed: 0,
            errors: Vec::new(),
            error: None,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.pending == 0 && self.error.is_none()
    }

    fn fail(&mut self, id: &str, message: String) {
        self.failed += 1;
        self.errors.push(MigrationRecordError {
            id: id.to_string(),
            message,
        });
    }
}

/// Aggregate outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub collections: Vec<CollectionReport>,
    /// True iff no collection reported a failure, an error, or pending work.
    pub success: bool,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl MigrationReport {
    pub fn newly_encrypted(&self) -> usize {
        self.collections.iter().map(|c| c.newly_encrypted).sum()
    }

    pub fn already_encrypted(&self) -> usize {
        self.collections.iter().map(|c| c.already_encrypted).sum()
    }

    pub fn failed(&self) -> usize {
        self.collections.iter().map(|c| c.failed).sum()
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionReport> {
        self.collections.iter().find(|c| c.collection == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Apply,
    DryRun,
}

/// Re-encrypts stored plaintext under one DEK.
pub struct MigrationEngine<'a, A: VaultApi + ?Sized> {
    api: &'a A,
    config: &'a MigrationConfig,
    dek: &'a DataKey,
}

impl<'a, A: VaultApi + ?Sized> MigrationEngine<'a, A> {
    pub fn new(api: &'a A, config: &'a MigrationConfig, dek: &'a DataKey) -> Self {
        Self { api, config, dek }
    }

    /// Seal every plaintext sensitive field in the given collections.
    pub async fn run(&self, kinds: &[EntityKind]) -> MigrationReport {
        self.execute(kinds, Mode::Apply).await
    }

    /// Classify without writing anything.
    pub async fn scan(&self, kinds: &[EntityKind]) -> MigrationReport {
        self.execute(kinds, Mode::DryRun).await
    }

    async fn execute(&self, kinds: &[EntityKind], mode: Mode) -> MigrationReport {
        let started_at = Utc::now();
        let mut collections = Vec::with_capacity(kinds.len());

        for kind in kinds {
            let mut report = CollectionReport::new(kind.collection());
            if let Err(e) = self.migrate_collection(*kind, mode, &mut report).await {
                warn!(collection = kind.collection(), error = %e, "collection migration aborted");
                report.error = Some(e.to_string());
            }
            info!(
                collection = kind.collection(),
                total = report.total,
                newly_encrypted = report.newly_encrypted,
                already_encrypted = report.already_encrypted,
                pending = report.pending,
                failed = report.failed,
                "collection migration finished"
            );
            collections.push(report);
        }

        let success = collections.iter().all(CollectionReport::is_clean);
        MigrationReport {
            collections,
            success,
            dry_run: mode == Mode::DryRun,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn migrate_collection(
        &self,
        kind: EntityKind,
        mode: Mode,
        report: &mut CollectionReport,
    ) -> Result<()> {
        let collection = kind.collection();
        let sort = self.config.sort();
        let mut page = 1u32;

        loop {
            let fetched = self
                .api
                .fetch_page(collection, page, self.config.page_size, &sort)
                .await?;
            debug!(collection, page, records = fetched.records.len(), "fetched page");

            let mut updates = Vec::new();
            for record in &fetched.records {
                report.total += 1;
                match self.prepare_update(kind, record) {
                    Ok(Some(update)) => updates.push(update),
                    Ok(None) => report.already_encrypted += 1,
                    Err(e) => report.fail(&record.id, e.to_string()),
                }
            }

            match mode {
                Mode::Apply => self.flush(collection, updates, report).await,
                Mode::DryRun => report.pending += updates.len(),
            }

            if !fetched.has_more || fetched.records.is_empty() {
                return Ok(());
            }
            page += 1;
        }
    }

    /// Build the update for one record, or `None` if nothing is plaintext.
    fn prepare_update(&self, kind: EntityKind, record: &Record) -> Result<Option<RecordUpdate>> {
        let mut data = Map::new();
        for field in kind.sensitive_fields() {
            let Some(value) = record.fields.get(*field) else {
                continue;
            };
            if codec::count_plaintext_leaves(value, self.dek) == 0 {
                continue;
            }
            let mut sealed = value.clone();
            codec::seal_plaintext_leaves(&mut sealed, self.dek)?;
            data.insert((*field).to_string(), sealed);
        }

        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(RecordUpdate {
            id: record.id.clone(),
            data,
        }))
    }

    /// Send updates in batches. Each batch succeeds or fails as a whole.
    async fn flush(
        &self,
        collection: &str,
        mut updates: Vec<RecordUpdate>,
        report: &mut CollectionReport,
    ) {
        let batch_size = self.config.batch_size.max(1);
        while !updates.is_empty() {
            let rest = updates.split_off(batch_size.min(updates.len()));
            let batch = std::mem::replace(&mut updates, rest);
            let ids: Vec<String> = batch.iter().map(|u| u.id.clone()).collect();

            match self.api.bulk_update(collection, batch).await {
                Ok(result) => {
                    if (result.matched_count as usize) < ids.len() {
                        warn!(
                            collection,
                            sent = ids.len(),
                            matched = result.matched_count,
                            "bulk update matched fewer records than sent"
                        );
                    }
                    report.newly_encrypted += ids.len();
                }
                Err(e) => {
                    warn!(collection, batch = ids.len(), error = %e, "bulk update failed");
                    let message = e.to_string();
                    for id in &ids {
                        report.fail(id, message.clone());
                    }
                }
            }
        }
    }
}
