//! JSON File Store
//!
//! Keeps the population in memory and mirrors it to a single JSON
//! document (`{"version": 1, "players": {...}}`). Every mutation is written
//! to a temporary file and renamed over the target before the in-memory
//! copy is committed, so a failed write leaves both untouched.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::game::state::{PlayerId, PlayerRecord};
use crate::store::{check_swap, PlayerStore, StoreError, SCHEMA_VERSION};

type Records = BTreeMap<PlayerId, PlayerRecord>;

/// On-disk layout as read. Records are decoded one by one so a failure
/// can name the offending entry.
#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    players: BTreeMap<String, serde_json::Value>,
}

/// On-disk layout as written.
#[derive(Serialize)]
struct Document<'a> {
    version: u32,
    players: &'a Records,
}

/// Durable store backed by one JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: RwLock<Records>,
}

impl JsonFileStore {
    /// Open the store, loading existing records if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let records = match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => {
                warn!(path = %path.display(), "state file is empty, starting with no players");
                Records::new()
            }
            Ok(text) => decode_document(&text)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no state file yet, starting with no players");
                Records::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), players = records.len(), "opened state file");

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the records, persist it, then commit.
    async fn mutate<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Records) -> Result<(), StoreError> + Send,
    {
        let mut records = self.records.write().await;
        let mut next = records.clone();
        change(&mut next)?;
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }

    async fn persist(&self, records: &Records) -> Result<(), StoreError> {
        let document = Document {
            version: SCHEMA_VERSION,
            players: records,
        };
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| StoreError::Corrupt(format!("failed to encode state: {e}")))?;

        let tmp = temp_path(&self.path);
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), players = records.len(), "state file written");
        Ok(())
    }
}

#[async_trait]
impl PlayerStore for JsonFileStore {
    async fn get_by_id(&self, id: &PlayerId) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<PlayerRecord>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn insert_if_absent(&self, record: PlayerRecord) -> Result<(), StoreError> {
        self.mutate(move |records| {
            if records.contains_key(&record.id) {
                return Err(StoreError::AlreadyExists(record.id));
            }
            records.insert(record.id.clone(), record);
            Ok(())
        })
        .await
    }

    async fn compare_and_swap_on_move(
        &self,
        id: &PlayerId,
        expected: Option<NaiveDate>,
        record: PlayerRecord,
    ) -> Result<(), StoreError> {
        self.mutate(move |records| {
            check_swap(id, records.get(id), expected, &record)?;
            records.insert(id.clone(), record);
            Ok(())
        })
        .await
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        records.clear();
        info!(path = %self.path.display(), "state file removed");
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        let records = self.records.read().await;
        info!(path = %self.path.display(), players = records.len(), "closing state file");
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "game_state.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

fn decode_document(text: &str) -> Result<Records, StoreError> {
    let raw: RawDocument = serde_json::from_str(text)
        .map_err(|e| StoreError::Corrupt(format!("state file is not a valid document: {e}")))?;

    if raw.version != SCHEMA_VERSION {
        // Older servers used this field as a write counter.
        debug!(found = raw.version, expected = SCHEMA_VERSION, "state file version differs");
    }

    let mut records = Records::new();
    for (key, value) in raw.players {
        let mut record: PlayerRecord = serde_json::from_value(value)
            .map_err(|e| StoreError::Corrupt(format!("player {key}: {e}")))?;

        if record.id.is_empty() {
            record.id = PlayerId::new(key.clone());
        } else if record.id.as_str() != key {
            return Err(StoreError::Corrupt(format!(
                "player {key}: record id {} does not match its key",
                record.id
            )));
        }

        record
            .check_integrity()
            .map_err(|e| StoreError::Corrupt(format!("player {key}: {e}")))?;

        records.insert(record.id.clone(), record);
    }

    Ok(records)
}
