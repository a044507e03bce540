//! In-Memory Store
//!
//! Records live in a BTreeMap behind a tokio RwLock. Each trait method
//! takes the lock once, so every call is atomic.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::game::state::{PlayerId, PlayerRecord};
use crate::store::{check_swap, PlayerStore, StoreError};

/// Volatile store, lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<PlayerId, PlayerRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records.
    pub fn with_records(records: impl IntoIterator<Item = PlayerRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// True when no records are stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl PlayerStore for MemoryStore {
    async fn get_by_id(&self, id: &PlayerId) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<PlayerRecord>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn insert_if_absent(&self, record: PlayerRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn compare_and_swap_on_move(
        &self,
        id: &PlayerId,
        expected: Option<NaiveDate>,
        record: PlayerRecord,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        check_swap(id, records.get(id), expected, &record)?;
        records.insert(id.clone(), record);
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        self.records.write().await.clear();
        Ok(())
    }
}
