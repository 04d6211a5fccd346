//! In-memory case store for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::Utc;

use crate::store::{CaseRecord, CaseStore, CaseUpdate, FolderId, StoreError, UpsertOutcome};

/// Mock implementation of the CaseStore trait.
///
/// Keeps records in a map behind one mutex, which makes folder allocation
/// trivially linearizable. Can be switched to "unavailable" to exercise
/// persistence failures.
#[derive(Debug, Default)]
pub struct MockCaseStore {
    records: Mutex<HashMap<String, CaseRecord>>,
    unavailable: AtomicBool,
    upserts: AtomicUsize,
}

impl MockCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Seed a record directly, e.g. one imported from a legacy system.
    ///
    /// Panics if the record map's lock is poisoned.
    pub fn insert_record(&self, record: CaseRecord) {
        self.records
            .lock()
            .expect("mock store lock poisoned")
            .insert(record.target_id.clone(), record);
    }

    /// Number of successful upserts.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored record.
    pub fn records(&self) -> Vec<CaseRecord> {
        self.records
            .lock()
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("mock store offline".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CaseRecord>>, StoreError> {
        self.records
            .lock()
            .map_err(|e| StoreError::Database(format!("lock poisoned: {}", e)))
    }
}

impl CaseStore for MockCaseStore {
    fn upsert(&self, update: &CaseUpdate) -> Result<UpsertOutcome, StoreError> {
        self.check_available()?;
        let mut records = self.lock()?;
        let now = Utc::now();

        if let Some(record) = records.get_mut(&update.target_id) {
            record.apply(update, now);
            self.upserts.fetch_add(1, Ordering::SeqCst);
            return Ok(UpsertOutcome {
                folder_id: record.folder_id.clone(),
                created: false,
            });
        }

        let max_sequence = records
            .values()
            .filter_map(|r| r.folder_id.parse::<FolderId>().ok())
            .filter(|id| {
                id.client_code() == update.client_code && id.module_code() == update.module_code
            })
            .map(|id| id.sequence())
            .max();
        let folder_id = FolderId::next_after(&update.client_code, &update.module_code, max_sequence)?;

        let record = CaseRecord::create(update, &folder_id, now);
        records.insert(update.target_id.clone(), record);
        self.upserts.fetch_add(1, Ordering::SeqCst);

        Ok(UpsertOutcome {
            folder_id: folder_id.to_string(),
            created: true,
        })
    }

    fn get(&self, target_id: &str) -> Result<Option<CaseRecord>, StoreError> {
        self.check_available()?;
        Ok(self.lock()?.get(target_id).cloned())
    }

    fn list_by_prefix(
        &self,
        client_code: &str,
        module_code: &str,
    ) -> Result<Vec<CaseRecord>, StoreError> {
        self.check_available()?;
        let mut matching: Vec<CaseRecord> = self
            .lock()?
            .values()
            .filter(|r| r.client_code == client_code && r.module_code == module_code)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.folder_id.cmp(&b.folder_id));
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Classification, ClassificationPatch};

    fn update(target_id: &str) -> CaseUpdate {
        CaseUpdate {
            target_id: target_id.to_string(),
            client_code: "0001".to_string(),
            client_name: "Borrachas Vipal S.A.".to_string(),
            module_code: "3".to_string(),
            aggregate_value: Some(1.0),
            initial_classification: Classification {
                category: "civil".to_string(),
                side: "defendant".to_string(),
                risk: "possible".to_string(),
            },
            classification: ClassificationPatch::default(),
            payloads: Default::default(),
        }
    }

    #[test]
    fn test_allocates_after_seeded_record() {
        let store = MockCaseStore::new();
        let legacy = FolderId::new("0001", "3", 41).unwrap();
        store.insert_record(CaseRecord::create(&update("LEGACY"), &legacy, Utc::now()));

        let outcome = tokio_test::assert_ok!(store.upsert(&update("CASE-001")));
        assert_eq!(outcome.folder_id, "0001.3.00042");
        assert!(outcome.created);

        let again = store.upsert(&update("CASE-001")).unwrap();
        assert_eq!(again.folder_id, "0001.3.00042");
        assert!(!again.created);
        assert_eq!(store.upsert_count(), 2);
        assert_eq!(store.list_by_prefix("0001", "3").unwrap().len(), 2);
    }

    #[test]
    #[should_panic(expected = "mock store lock poisoned")]
    fn test_seeding_a_poisoned_store_panics() {
        let store = std::sync::Arc::new(MockCaseStore::new());
        let holder = std::sync::Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _records = holder.records.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        let legacy = FolderId::new("0001", "3", 1).unwrap();
        store.insert_record(CaseRecord::create(&update("LEGACY"), &legacy, Utc::now()));
    }

    #[test]
    fn test_unavailable_rejects_everything() {
        let store = MockCaseStore::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.upsert(&update("CASE-001")),
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.get("CASE-001").is_err());
        assert!(store.records().is_empty());
    }
}
