//! In-Memory History Backend
//!
//! A ledger held in process memory. Clones share the same ledger, so one
//! handle can be given to a resolver while another inspects or mutates the
//! rows, the way a second process would.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::core::MigrationHistoryBackend;
use super::DatabaseBackendType;
use crate::error::{MigrateError, MigrateResult};
use crate::migrations::definitions::MigrationRecord;

#[derive(Debug, Default)]
struct Ledger {
    rows: Mutex<BTreeMap<String, MigrationRecord>>,
    created: AtomicBool,
    writes: AtomicUsize,
}

/// Migration history kept in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    ledger: Arc<Ledger>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger that already contains `records`
    pub fn with_records(records: impl IntoIterator<Item = MigrationRecord>) -> Self {
        let history = Self::new();
        for record in records {
            history.insert(record);
        }
        history.ledger.created.store(true, Ordering::SeqCst);
        history
    }

    /// Insert or replace a row, bypassing the write guards
    pub fn insert(&self, record: MigrationRecord) {
        self.rows().insert(record.name.clone(), record);
    }

    pub fn get(&self, name: &str) -> Option<MigrationRecord> {
        self.rows().get(name).cloned()
    }

    pub fn records(&self) -> Vec<MigrationRecord> {
        self.rows().values().cloned().collect()
    }

    /// Whether `ensure_ledger` ran or the ledger was pre-populated
    pub fn ledger_exists(&self) -> bool {
        self.ledger.created.load(Ordering::SeqCst)
    }

    /// Number of successful guarded writes
    pub fn write_count(&self) -> usize {
        self.ledger.writes.load(Ordering::SeqCst)
    }

    fn rows(&self) -> MutexGuard<'_, BTreeMap<String, MigrationRecord>> {
        // A panic while holding the lock cannot leave a row half-written
        self.ledger
            .rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn guarded_update(
        &self,
        name: &str,
        apply: impl FnOnce(&mut MigrationRecord),
    ) -> MigrateResult<()> {
        let mut rows = self.rows();
        match rows.get_mut(name) {
            Some(record) if record.finished_at.is_none() && record.rolled_back_at.is_none() => {
                apply(record);
                self.ledger.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            _ => Err(MigrateError::ConcurrentModification {
                migration_name: name.to_string(),
            }),
        }
    }
}

#[async_trait]
impl MigrationHistoryBackend for InMemoryHistory {
    // Stands in for an embedded database
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    async fn ensure_ledger(&mut self) -> MigrateResult<()> {
        self.ledger.created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn find_by_name(&mut self, name: &str) -> MigrateResult<Option<MigrationRecord>> {
        Ok(self.get(name))
    }

    async fn mark_applied(&mut self, name: &str, finished_at: DateTime<Utc>) -> MigrateResult<()> {
        self.guarded_update(name, |record| record.finished_at = Some(finished_at))
    }

    async fn mark_rolled_back(
        &mut self,
        name: &str,
        rolled_back_at: DateTime<Utc>,
    ) -> MigrateResult<()> {
        self.guarded_update(name, |record| record.rolled_back_at = Some(rolled_back_at))
    }

    async fn close(self: Box<Self>) -> MigrateResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(name: &str) -> MigrationRecord {
        MigrationRecord::started(name, "checksum", Utc::now())
    }

    #[tokio::test]
    async fn test_clones_share_the_ledger() {
        let history = InMemoryHistory::new();
        let mut handle = history.clone();
        assert!(!history.ledger_exists());

        handle.ensure_ledger().await.unwrap();
        history.insert(failed("20201106130852_failed"));

        assert!(history.ledger_exists());
        assert!(handle.find_by_name("20201106130852_failed").await.unwrap().is_some());
        assert!(handle.find_by_name("does_not_exist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_guarded_writes() {
        let mut history = InMemoryHistory::with_records(vec![failed("20201106130852_failed")]);
        let now = Utc::now();

        history.mark_rolled_back("20201106130852_failed", now).await.unwrap();
        assert_eq!(history.write_count(), 1);

        let err = history
            .mark_applied("20201106130852_failed", now)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::ConcurrentModification { .. }));

        let record = history.get("20201106130852_failed").unwrap();
        assert_eq!(record.rolled_back_at, Some(now));
        assert_eq!(record.finished_at, None);
        assert_eq!(history.write_count(), 1);
    }

    #[tokio::test]
    async fn test_write_to_missing_row_conflicts() {
        let mut history = InMemoryHistory::new();
        let err = history.mark_applied("ghost", Utc::now()).await.unwrap_err();
        assert!(matches!(err, MigrateError::ConcurrentModification { .. }));
    }
}
